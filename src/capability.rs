//! Capability requirement expressions
//!
//! A requirement is a conjunction of groups; a group is satisfied when any one
//! of its tokens is available. Two wire syntaxes exist:
//!
//! - legacy: `hal led psoc6`, every whitespace-separated token is required
//! - bracketed: `hal [psoc6,t2gbe] [flash_2048k,flash_1024k]`, where each
//!   bracket pair is one OR group and bare tokens are required on their own
//!
//! Parsing never fails. Text left in an unclosed bracket, at the end of input
//! or at a nested `[`, is kept as plain required tokens split on whitespace
//! only, and a stray `]` is dropped.

use std::borrow::Borrow;
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;

/// Rendered for a requirement with no groups
pub const NO_REQUIREMENTS: &str = "(no requirements)";

/// Which wire syntax a requirement was parsed from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CapabilitySyntax {
    #[default]
    Legacy,
    Bracketed,
}

/// Parsed capability requirement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityRequirement {
    groups: Vec<Vec<String>>,
    syntax: CapabilitySyntax,
}

impl CapabilityRequirement {
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if input.is_empty() {
            return Self::default();
        }
        if !input.contains(['[', ']']) {
            return Self {
                groups: input
                    .split_whitespace()
                    .map(|token| vec![token.to_string()])
                    .collect(),
                syntax: CapabilitySyntax::Legacy,
            };
        }

        let mut groups = Vec::new();
        let mut current = String::new();
        let mut in_bracket = false;

        for ch in input.chars() {
            match ch {
                '[' => {
                    push_plain(&mut groups, &current);
                    current.clear();
                    in_bracket = true;
                }
                ']' => {
                    if in_bracket {
                        push_or_group(&mut groups, &current);
                        current.clear();
                        in_bracket = false;
                    }
                }
                c if c.is_whitespace() && !in_bracket => {
                    push_plain(&mut groups, &current);
                    current.clear();
                }
                c => current.push(c),
            }
        }

        push_plain(&mut groups, &current);

        Self {
            groups,
            syntax: CapabilitySyntax::Bracketed,
        }
    }

    /// Build from groups directly; empty groups are dropped
    pub fn from_groups<I, G, T>(groups: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let groups: Vec<Vec<String>> = groups
            .into_iter()
            .map(|g| g.into_iter().map(Into::into).collect::<Vec<_>>())
            .filter(|g| !g.is_empty())
            .collect();
        let syntax = if groups.iter().any(|g| g.len() > 1) {
            CapabilitySyntax::Bracketed
        } else {
            CapabilitySyntax::Legacy
        };
        Self { groups, syntax }
    }

    pub fn groups(&self) -> &[Vec<String>] {
        &self.groups
    }

    pub fn syntax(&self) -> CapabilitySyntax {
        self.syntax
    }

    pub fn is_bracketed(&self) -> bool {
        self.syntax == CapabilitySyntax::Bracketed
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Every token mentioned, in order of first appearance
    pub fn tokens(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.groups
            .iter()
            .flatten()
            .map(String::as_str)
            .filter(|token| seen.insert(*token))
            .collect()
    }

    /// True when every group has at least one token in `available`
    pub fn matches<S>(&self, available: &HashSet<S>) -> bool
    where
        S: Borrow<str> + Eq + Hash,
    {
        self.groups
            .iter()
            .all(|group| group.iter().any(|token| available.contains(token.as_str())))
    }

    /// Groups with no token in `available`
    pub fn unsatisfied<S>(&self, available: &HashSet<S>) -> Vec<&[String]>
    where
        S: Borrow<str> + Eq + Hash,
    {
        self.groups
            .iter()
            .filter(|group| !group.iter().any(|token| available.contains(token.as_str())))
            .map(Vec::as_slice)
            .collect()
    }

    /// Render in bracketed wire syntax
    pub fn to_wire(&self) -> String {
        self.groups
            .iter()
            .map(|group| match group.as_slice() {
                [single] => single.clone(),
                many => format!("[{}]", many.join(",")),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn push_plain(groups: &mut Vec<Vec<String>>, text: &str) {
    groups.extend(text.split_whitespace().map(|t| vec![t.to_string()]));
}

fn push_or_group(groups: &mut Vec<Vec<String>>, text: &str) {
    let group: Vec<String> = text
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    if !group.is_empty() {
        groups.push(group);
    }
}

impl fmt::Display for CapabilityRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.groups.is_empty() {
            return f.write_str(NO_REQUIREMENTS);
        }
        for (i, group) in self.groups.iter().enumerate() {
            if i > 0 {
                f.write_str(" AND ")?;
            }
            match group.as_slice() {
                [single] => f.write_str(single)?,
                many => write!(f, "({})", many.join(" OR "))?,
            }
        }
        Ok(())
    }
}

impl From<&str> for CapabilityRequirement {
    fn from(input: &str) -> Self {
        Self::parse(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(tokens: &[&'static str]) -> HashSet<&'static str> {
        tokens.iter().copied().collect()
    }

    fn groups(req: &CapabilityRequirement) -> Vec<Vec<&str>> {
        req.groups()
            .iter()
            .map(|g| g.iter().map(String::as_str).collect())
            .collect()
    }

    #[test]
    fn empty_is_vacuous() {
        for input in ["", "   ", "\t\n"] {
            let req = CapabilityRequirement::parse(input);
            assert!(req.is_empty());
            assert!(req.matches(&set(&[])));
            assert_eq!(req.to_string(), NO_REQUIREMENTS);
        }
    }

    #[test]
    fn legacy_one_group_per_field() {
        let req = CapabilityRequirement::parse("  hal   led\tpsoc6 ");
        assert!(!req.is_bracketed());
        assert_eq!(groups(&req), vec![vec!["hal"], vec!["led"], vec!["psoc6"]]);
        assert!(req.matches(&set(&["hal", "led", "psoc6", "extra"])));
        assert!(!req.matches(&set(&["hal", "led"])));
    }

    #[test]
    fn bracketed_board_scenario() {
        let req = CapabilityRequirement::parse("hal [psoc6,t2gbe] [flash_2048k,flash_1024k]");
        assert!(req.is_bracketed());
        assert!(req.matches(&set(&["hal", "t2gbe", "flash_1024k"])));
        assert!(!req.matches(&set(&["hal", "t2gbe", "flash_512k"])));
        assert_eq!(
            req.to_string(),
            "hal AND (psoc6 OR t2gbe) AND (flash_2048k OR flash_1024k)"
        );
    }

    #[test]
    fn bracket_contents_trimmed_and_empty_dropped() {
        let req = CapabilityRequirement::parse("[ a , ,b ] [] [ , ] c");
        assert_eq!(groups(&req), vec![vec!["a", "b"], vec!["c"]]);
    }

    #[test]
    fn bracket_adjacent_to_token() {
        let req = CapabilityRequirement::parse("hal[a,b]led");
        assert_eq!(groups(&req), vec![vec!["hal"], vec!["a", "b"], vec!["led"]]);
    }

    #[test]
    fn single_token_bracket_renders_bare() {
        let req = CapabilityRequirement::parse("[psoc6]");
        assert!(req.is_bracketed());
        assert_eq!(req.to_string(), "psoc6");
    }

    #[test]
    fn unbalanced_brackets_recover() {
        let open = CapabilityRequirement::parse("hal [a,b");
        assert_eq!(groups(&open), vec![vec!["hal"], vec!["a,b"]]);
        assert!(!open.matches(&HashSet::from(["hal", "a"])));

        let nested = CapabilityRequirement::parse("[a,b [c,d]");
        assert_eq!(groups(&nested), vec![vec!["a,b"], vec!["c", "d"]]);

        let spaced = CapabilityRequirement::parse("[a, b");
        assert_eq!(groups(&spaced), vec![vec!["a,"], vec!["b"]]);

        let stray = CapabilityRequirement::parse("hal] led");
        assert!(stray.is_bracketed());
        assert_eq!(groups(&stray), vec![vec!["hal"], vec!["led"]]);
    }

    #[test]
    fn wire_roundtrip() {
        for input in [
            "hal [psoc6,t2gbe] [flash_2048k,flash_1024k]",
            "[a, b ,c] tok [d,e] tok2",
            "[x]",
        ] {
            let req = CapabilityRequirement::parse(input);
            let again = CapabilityRequirement::parse(&req.to_wire());
            assert_eq!(req.groups(), again.groups(), "input {input:?}");
        }
    }

    #[test]
    fn matches_uses_any_borrowable_set() {
        let req = CapabilityRequirement::parse("[a,b] c");
        let owned: HashSet<String> = ["b".to_string(), "c".to_string()].into_iter().collect();
        assert!(req.matches(&owned));
    }

    #[test]
    fn unsatisfied_groups_listed() {
        let req = CapabilityRequirement::parse("hal [psoc6,t2gbe] led");
        let missing = req.unsatisfied(&set(&["hal"]));
        assert_eq!(missing.len(), 2);
        assert_eq!(missing[0], ["psoc6".to_string(), "t2gbe".to_string()]);
    }

    #[test]
    fn tokens_deduplicated() {
        let req = CapabilityRequirement::parse("a [a,b] b c");
        assert_eq!(req.tokens(), vec!["a", "b", "c"]);
    }

    #[test]
    fn from_groups_infers_syntax() {
        let legacy = CapabilityRequirement::from_groups([["a"], ["b"]]);
        assert!(!legacy.is_bracketed());
        let bracketed = CapabilityRequirement::from_groups(vec![vec!["a", "b"], vec![]]);
        assert!(bracketed.is_bracketed());
        assert_eq!(bracketed.groups().len(), 1);
    }
}
