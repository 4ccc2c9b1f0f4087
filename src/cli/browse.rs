use crate::dashboard::{SortOrder, StatusFilter};

pub const HELP: &str = "\
  <Enter>          load more (end of list reached)
  s <status>       status filter: pending, responded, all
  c <category>     category filter (c all clears)
  / <term>         search (/ alone clears)
  p                random priority scores
  P                backend priority scores
  o asc|desc       order by priority
  r <id> <text>    respond to an initiative
  h                this help
  q                quit";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BrowseCommand {
    More,
    Status(StatusFilter),
    Category(Option<String>),
    Search(Option<String>),
    RandomPriority,
    RemotePriority,
    Sort(SortOrder),
    Respond { id: u64, text: String },
    Help,
    Quit,
}

fn optional(rest: &str) -> Option<String> {
    let rest = rest.trim();
    if rest.is_empty() || rest.eq_ignore_ascii_case("all") {
        None
    } else {
        Some(rest.to_string())
    }
}

pub fn parse_line(line: &str) -> Result<BrowseCommand, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(BrowseCommand::More);
    }
    if let Some(rest) = line.strip_prefix('/') {
        let term = rest.trim();
        return Ok(BrowseCommand::Search(
            (!term.is_empty()).then(|| term.to_string()),
        ));
    }
    let (head, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    match head {
        "q" | "quit" | "exit" => Ok(BrowseCommand::Quit),
        "h" | "help" | "?" => Ok(BrowseCommand::Help),
        "p" => Ok(BrowseCommand::RandomPriority),
        "P" => Ok(BrowseCommand::RemotePriority),
        "s" => StatusFilter::parse(rest)
            .map(BrowseCommand::Status)
            .ok_or_else(|| format!("unknown status '{rest}'")),
        "c" => Ok(BrowseCommand::Category(optional(rest))),
        "o" => SortOrder::parse(rest)
            .map(BrowseCommand::Sort)
            .ok_or_else(|| format!("unknown order '{rest}', expected asc or desc")),
        "r" => {
            let (id, text) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| "usage: r <id> <text>".to_string())?;
            let id = id
                .parse::<u64>()
                .map_err(|_| format!("invalid id '{id}'"))?;
            let text = text.trim();
            if text.is_empty() {
                return Err("usage: r <id> <text>".to_string());
            }
            Ok(BrowseCommand::Respond {
                id,
                text: text.to_string(),
            })
        }
        other => Err(format!("unknown command '{other}', h for help")),
    }
}
