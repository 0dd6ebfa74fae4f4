//! Editor commands typed between the two stages.

use crate::error::CommandError;
use crate::models::Candidate;

/// Usage lines shown wherever commands are accepted
pub const COMMAND_HELP: &[&str] = &[
    "#選擇 2 5 7 9 12",
    "#重搜 關鍵詞A, 關鍵詞B",
    "#過濾 類別=研究突破, 來源≠路邊媒體",
    "#合併 3 8",
    "#補證據 4",
    "#改分類 6=企業應用",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Select(Vec<usize>),
    Research(Vec<String>),
    Filter(Vec<FilterCondition>),
    Merge(Vec<usize>),
    Evidence(usize),
    Recategorize { id: usize, category: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    Category,
    Source,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Equals,
    NotEquals,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterCondition {
    pub field: FilterField,
    pub op: FilterOp,
    pub value: String,
}

impl FilterCondition {
    /// Category compares whole values, source matches by substring; both ignore case
    pub fn matches(&self, candidate: &Candidate) -> bool {
        let wanted = self.value.to_lowercase();
        let hit = match self.field {
            FilterField::Category => candidate.category.to_lowercase() == wanted,
            FilterField::Source => candidate.source.to_lowercase().contains(&wanted),
        };
        match self.op {
            FilterOp::Equals => hit,
            FilterOp::NotEquals => !hit,
        }
    }
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim();
        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };

        match head {
            // No ids clears the selection
            "#選擇" | "#select" => Ok(Command::Select(parse_ids("#選擇", rest)?)),
            "#重搜" | "#research" => {
                let keywords: Vec<String> = split_list(rest).map(str::to_string).collect();
                if keywords.is_empty() {
                    return Err(CommandError::MissingArgument { command: "#重搜" });
                }
                Ok(Command::Research(keywords))
            }
            "#過濾" | "#filter" => {
                let conditions = split_list(rest)
                    .map(parse_condition)
                    .collect::<Result<Vec<_>, _>>()?;
                if conditions.is_empty() {
                    return Err(CommandError::MissingArgument { command: "#過濾" });
                }
                Ok(Command::Filter(conditions))
            }
            "#合併" | "#merge" => {
                let ids = parse_ids("#合併", rest)?;
                if ids.len() < 2 {
                    return Err(CommandError::MissingArgument { command: "#合併" });
                }
                Ok(Command::Merge(ids))
            }
            "#補證據" | "#evidence" => {
                let ids = parse_ids("#補證據", rest)?;
                match ids.as_slice() {
                    [id] => Ok(Command::Evidence(*id)),
                    [] => Err(CommandError::MissingArgument { command: "#補證據" }),
                    _ => Err(CommandError::InvalidId {
                        command: "#補證據",
                        value: rest.to_string(),
                    }),
                }
            }
            "#改分類" | "#recategorize" => {
                let (id, category) = rest
                    .split_once('=')
                    .ok_or_else(|| CommandError::InvalidAssignment(rest.to_string()))?;
                let id = id.trim().parse().map_err(|_| CommandError::InvalidId {
                    command: "#改分類",
                    value: id.trim().to_string(),
                })?;
                let category = category.trim();
                if category.is_empty() {
                    return Err(CommandError::InvalidAssignment(rest.to_string()));
                }
                Ok(Command::Recategorize {
                    id,
                    category: category.to_string(),
                })
            }
            _ => Err(CommandError::Unknown(line.to_string())),
        }
    }
}

fn parse_ids(command: &'static str, rest: &str) -> Result<Vec<usize>, CommandError> {
    rest.split(|c: char| c.is_whitespace() || c == ',' || c == '，')
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse().map_err(|_| CommandError::InvalidId {
                command,
                value: s.to_string(),
            })
        })
        .collect()
}

fn split_list(rest: &str) -> impl Iterator<Item = &str> {
    rest.split([',', '，']).map(str::trim).filter(|s| !s.is_empty())
}

fn parse_condition(raw: &str) -> Result<FilterCondition, CommandError> {
    let (field, op, value) = if let Some((f, v)) = raw.split_once('≠') {
        (f, FilterOp::NotEquals, v)
    } else if let Some((f, v)) = raw.split_once("!=") {
        (f, FilterOp::NotEquals, v)
    } else if let Some((f, v)) = raw.split_once('=') {
        (f, FilterOp::Equals, v)
    } else {
        return Err(CommandError::InvalidFilter(raw.to_string()));
    };

    let field = match field.trim().to_lowercase().as_str() {
        "類別" | "分類" | "category" => FilterField::Category,
        "來源" | "source" => FilterField::Source,
        _ => return Err(CommandError::InvalidFilter(raw.to_string())),
    };

    let value = value.trim();
    if value.is_empty() {
        return Err(CommandError::InvalidFilter(raw.to_string()));
    }

    Ok(FilterCondition {
        field,
        op,
        value: value.to_string(),
    })
}
