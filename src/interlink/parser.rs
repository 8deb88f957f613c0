// ============================================================================
// SECTION: Rule grammar and tokenizer
// ============================================================================

use std::fmt;

/// Maximum number of lines accepted in a single rule file. Prevents a
/// pathological file from blowing up the reconciliation transaction.
const MAX_RULE_LINES: usize = 50_000;

/// A single parsed interlink directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterlinkRule {
    AssetGroupAdd {
        name: String,
    },
    OwnerAdd {
        operator: String,
        team: String,
    },
    HostGroupLink {
        pattern: String,
        group: String,
    },
    WebsiteGroupLink {
        pattern: String,
        group: String,
    },
    HostOwnerLink {
        pattern: String,
        operator: String,
        team: String,
        triage: Option<String>,
    },
    AssetGroupServiceLink {
        group_pattern: String,
        service_pattern: String,
    },
}

/// A structured failure while parsing a rule file. Carries the 1-indexed
/// line number so an operator can find the bad line without re-reading
/// the whole file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    TooManyLines { max_lines: usize },
    UnrecognizedLine { line: usize, text: String },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooManyLines { max_lines } => {
                write!(f, "rule file exceeds {max_lines} lines")
            }
            Self::UnrecognizedLine { line, text } => {
                write!(f, "syntax error at line {line}: {text:?}")
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Parses a whole rule file. Parsing is whole-file-or-nothing: the first
/// unrecognized line aborts the parse and no rules are returned, so a
/// partially-correct file can never apply half its rules.
///
/// A bare `add website <name>` line is accepted syntactically (it was a
/// real rule shape in the original implementation) but produces no
/// `InterlinkRule` — it was never consulted by any phase there either, so
/// it is dropped silently here rather than resurrected as a no-op variant.
pub fn parse_rules(input: &str) -> Result<Vec<InterlinkRule>, ParseError> {
    let mut rules = Vec::new();

    for (idx, raw_line) in input.lines().enumerate() {
        if idx >= MAX_RULE_LINES {
            return Err(ParseError::TooManyLines {
                max_lines: MAX_RULE_LINES,
            });
        }
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match parse_line(&tokens) {
            Some(Some(rule)) => rules.push(rule),
            Some(None) => {} // recognized-but-inert shape (`add website ...`)
            None => {
                return Err(ParseError::UnrecognizedLine {
                    line: idx + 1,
                    text: line.to_string(),
                })
            }
        }
    }

    Ok(rules)
}

/// Returns `Some(Some(rule))` for a recognized, actionable rule line,
/// `Some(None)` for a recognized but inert shape, and `None` for anything
/// that fails the grammar in spec.md §4.D.
fn parse_line(tokens: &[&str]) -> Option<Option<InterlinkRule>> {
    match tokens {
        ["add", "assetgroup", name] => Some(Some(InterlinkRule::AssetGroupAdd {
            name: (*name).to_string(),
        })),
        ["add", "owner", operator, team] => Some(Some(InterlinkRule::OwnerAdd {
            operator: (*operator).to_string(),
            team: (*team).to_string(),
        })),
        ["add", "website", _name] => Some(None),
        ["host", "matches", pattern, "link", "assetgroup", group] => {
            Some(Some(InterlinkRule::HostGroupLink {
                pattern: (*pattern).to_string(),
                group: (*group).to_string(),
            }))
        }
        ["website", "matches", pattern, "link", "assetgroup", group] => {
            Some(Some(InterlinkRule::WebsiteGroupLink {
                pattern: (*pattern).to_string(),
                group: (*group).to_string(),
            }))
        }
        ["host", "matches", pattern, "ownership", operator, team] => {
            Some(Some(InterlinkRule::HostOwnerLink {
                pattern: (*pattern).to_string(),
                operator: (*operator).to_string(),
                team: (*team).to_string(),
                triage: None,
            }))
        }
        ["host", "matches", pattern, "ownership", operator, team, triage] => {
            Some(Some(InterlinkRule::HostOwnerLink {
                pattern: (*pattern).to_string(),
                operator: (*operator).to_string(),
                team: (*team).to_string(),
                triage: Some((*triage).to_string()),
            }))
        }
        ["assetgroup", "matches", group_pattern, "link", "service", service_pattern] => {
            Some(Some(InterlinkRule::AssetGroupServiceLink {
                group_pattern: (*group_pattern).to_string(),
                service_pattern: (*service_pattern).to_string(),
            }))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_rule_shape() {
        let input = "\
# a comment
add assetgroup webservers

add owner alice secops
host matches ^web[0-9]+\\.example\\.com$ link assetgroup webservers
website matches ^www\\.example\\.com$ link assetgroup webservers
host matches ^db[0-9]+\\.example\\.com$ ownership bob dbteam
host matches ^db[0-9]+\\.example\\.com$ ownership bob dbteam dbteam-special
assetgroup matches webservers link service ^frontend-.*$
";
        let rules = parse_rules(input).unwrap();
        assert_eq!(rules.len(), 7);
        assert_eq!(
            rules[0],
            InterlinkRule::AssetGroupAdd {
                name: "webservers".into()
            }
        );
        assert_eq!(
            rules[6],
            InterlinkRule::AssetGroupServiceLink {
                group_pattern: "webservers".into(),
                service_pattern: "^frontend-.*$".into(),
            }
        );
    }

    #[test]
    fn whole_file_rejected_on_first_bad_line() {
        let input = "add assetgroup webservers\nnonsense line here\n";
        let err = parse_rules(input).unwrap_err();
        assert_eq!(
            err,
            ParseError::UnrecognizedLine {
                line: 2,
                text: "nonsense line here".into()
            }
        );
    }

    #[test]
    fn blank_lines_and_comments_skipped() {
        let rules = parse_rules("\n  \n# comment\nadd assetgroup x\n").unwrap();
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn bare_add_website_is_recognized_but_produces_no_rule() {
        let rules = parse_rules("add website shop.example.com\n").unwrap();
        assert_eq!(rules.len(), 0);
    }

    #[test]
    fn host_ownership_with_triage_override() {
        let rules =
            parse_rules("host matches ^db\\. ownership bob dbteam dbteam-special\n").unwrap();
        assert_eq!(
            rules[0],
            InterlinkRule::HostOwnerLink {
                pattern: "^db\\.".into(),
                operator: "bob".into(),
                team: "dbteam".into(),
                triage: Some("dbteam-special".into()),
            }
        );
    }
}
