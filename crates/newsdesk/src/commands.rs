use anyhow::{Context, Result};
use shared::SearchMode;

/// One line typed at the prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Search(String),
    Mode(Option<SearchMode>),
    Size(u32),
    List,
    Show(usize),
    Classify(usize),
    Curate,
    Post {
        index: usize,
        comment: Option<String>,
    },
    PostShortlist,
    Draft(String),
    Image(usize),
    Preview(usize),
    Clear,
    Status,
    Help,
    Quit,
}

/// Parse a prompt line. Blank lines yield `None`.
///
/// Article numbers are typed 1-based and returned 0-based.
pub fn parse(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_lowercase().as_str() {
        "search" | "s" => {
            if rest.is_empty() {
                anyhow::bail!("Usage: search <term>[, <term>...]");
            }
            Command::Search(rest.to_string())
        }
        "mode" => {
            if rest.is_empty() {
                Command::Mode(None)
            } else {
                let mode = rest.parse::<SearchMode>().map_err(anyhow::Error::msg)?;
                Command::Mode(Some(mode))
            }
        }
        "size" => {
            let size: u32 = rest
                .parse()
                .context("Usage: size <1-100>")?;
            if !(1..=100).contains(&size) {
                anyhow::bail!("Page size must be between 1 and 100");
            }
            Command::Size(size)
        }
        "list" | "ls" => Command::List,
        "show" => Command::Show(article_number(rest)?),
        "classify" | "c" => Command::Classify(article_number(rest)?),
        "curate" => Command::Curate,
        "post" | "p" => {
            let (first, comment) = match rest.split_once(char::is_whitespace) {
                Some((first, comment)) => (first, Some(comment.trim().to_string())),
                None => (rest, None),
            };
            if first.eq_ignore_ascii_case("shortlist") {
                Command::PostShortlist
            } else {
                Command::Post {
                    index: article_number(first)?,
                    comment: comment.filter(|c| !c.is_empty()),
                }
            }
        }
        "draft" => {
            if rest.is_empty() {
                anyhow::bail!("Usage: draft <text>");
            }
            Command::Draft(rest.to_string())
        }
        "image" | "i" => Command::Image(article_number(rest)?),
        "preview" | "v" => Command::Preview(article_number(rest)?),
        "clear" => Command::Clear,
        "status" => Command::Status,
        "help" | "h" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => anyhow::bail!("Unknown command: {}. Type 'help' for the list", other),
    };

    Ok(Some(command))
}

fn article_number(text: &str) -> Result<usize> {
    let number: usize = text
        .trim()
        .parse()
        .with_context(|| format!("Expected an article number, got {:?}", text.trim()))?;
    if number == 0 {
        anyhow::bail!("Article numbers start at 1");
    }
    Ok(number - 1)
}

pub const HELP: &str = "\
Commands:
  search <terms>          Search news for comma-separated terms (replaces the list)
  mode [mode]             Show or set the search mode (everything, top-headlines, sources)
  size <n>                Set results per term (1-100)
  list                    List the current articles
  show <n>                Show one article in full
  classify <n>            Classify article n
  curate                  Shortlist the most relevant articles
  post <n> [comment]      Write a LinkedIn post for article n
  post shortlist          Write a post from the current shortlist
  draft <text>            Write a post from free text
  image <n>               Generate an image for article n
  preview <n>             Show post, label and image for article n
  clear                   Drop the current results
  status                  Show settings and missing keys
  help                    Show this help
  quit                    Exit";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_line_is_no_command() {
        assert_eq!(parse("   ").unwrap(), None);
    }

    #[test]
    fn test_search_keeps_raw_terms() {
        assert_eq!(
            parse("search ai,  robotics ").unwrap(),
            Some(Command::Search("ai,  robotics".to_string()))
        );
        assert!(parse("search").is_err());
    }

    #[test]
    fn test_article_numbers_are_one_based() {
        assert_eq!(parse("classify 1").unwrap(), Some(Command::Classify(0)));
        assert_eq!(parse("IMAGE 3").unwrap(), Some(Command::Image(2)));
        assert!(parse("classify 0").is_err());
        assert!(parse("classify first").is_err());
        assert!(parse("preview").is_err());
    }

    #[test]
    fn test_post_variants() {
        assert_eq!(
            parse("post 2").unwrap(),
            Some(Command::Post {
                index: 1,
                comment: None
            })
        );
        assert_eq!(
            parse("post 2 focus on   Europe").unwrap(),
            Some(Command::Post {
                index: 1,
                comment: Some("focus on   Europe".to_string())
            })
        );
        assert_eq!(parse("post shortlist").unwrap(), Some(Command::PostShortlist));
    }

    #[test]
    fn test_mode_and_size() {
        assert_eq!(parse("mode").unwrap(), Some(Command::Mode(None)));
        assert_eq!(
            parse("mode 2").unwrap(),
            Some(Command::Mode(Some(SearchMode::TopHeadlines)))
        );
        assert!(parse("mode weekly").is_err());
        assert_eq!(parse("size 25").unwrap(), Some(Command::Size(25)));
        assert!(parse("size 0").is_err());
        assert!(parse("size 101").is_err());
    }

    #[test]
    fn test_unknown_command() {
        let err = parse("publish 1").unwrap_err();
        assert!(err.to_string().contains("Unknown command: publish"));
        assert_eq!(parse("q").unwrap(), Some(Command::Quit));
    }
}
