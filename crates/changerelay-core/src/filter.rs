//! Branch filter rules for Subversion path classification.

use crate::error::ConfigError;

/// An ordered path-matching rule that splits a repository path into a
/// branch prefix and a remainder file path.
///
/// `segments` are positional matchers against the path components: a
/// segment prefixed with `-` means "must NOT equal this component", any
/// other segment means "must equal this component". A path with fewer
/// components than the rule has segments does not match.
///
/// On a match, components `[from..to]` joined with `/` become the branch
/// and components `[to..]` the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchFilter {
    pub segments: Vec<String>,
    pub from: usize,
    pub to: usize,
}

impl BranchFilter {
    fn matches(&self, pieces: &[&str]) -> bool {
        if self.segments.len() > pieces.len() {
            return false;
        }
        for (idx, segment) in self.segments.iter().enumerate() {
            match segment.strip_prefix('-') {
                Some(denied) => {
                    if pieces[idx] == denied {
                        return false;
                    }
                }
                None => {
                    if pieces[idx] != segment {
                        return false;
                    }
                }
            }
        }
        true
    }

    fn split(&self, pieces: &[&str]) -> (String, String) {
        let cut = self.to.min(pieces.len());
        let start = self.from.min(cut);
        (pieces[start..cut].join("/"), pieces[cut..].join("/"))
    }
}

/// Classify a path against the ordered rule list, first match wins.
///
/// Returns `(Some(branch), file)` for the first matching rule, or
/// `(None, path)` when no rule matches.
pub fn classify(filters: &[BranchFilter], path: &str) -> (Option<String>, String) {
    let pieces: Vec<&str> = path.split('/').collect();
    for filter in filters {
        if filter.matches(&pieces) {
            let (branch, file) = filter.split(&pieces);
            return (Some(branch), file);
        }
    }
    (None, path.to_string())
}

/// Parse the configured filter string into an ordered rule list.
///
/// The format is `|`-separated clauses of comma-separated fields; the last
/// two fields of each clause are the `from`/`to` slice indices and the rest
/// are the segment matchers, e.g. `"project,trunk,0,2|project,branches,0,3"`.
/// An empty string yields no rules.
pub fn parse_filters(raw: &str) -> Result<Vec<BranchFilter>, ConfigError> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    let mut filters = Vec::new();
    for clause in raw.split('|') {
        let fields: Vec<&str> = clause.split(',').collect();
        if fields.len() < 2 {
            return Err(ConfigError::Filter {
                clause: clause.to_string(),
                reason: "expected at least a from and to index".to_string(),
            });
        }
        let index = |field: &str| {
            field.parse::<usize>().map_err(|_| ConfigError::Filter {
                clause: clause.to_string(),
                reason: format!("index {field:?} is not a number"),
            })
        };
        let from = index(fields[fields.len() - 2])?;
        let to = index(fields[fields.len() - 1])?;
        filters.push(BranchFilter {
            segments: fields[..fields.len() - 2]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            from,
            to,
        });
    }
    Ok(filters)
}
