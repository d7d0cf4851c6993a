//! Path ID algebra.
//!
//! Parses, formats, compares, and pattern-matches the hierarchical
//! identifiers (`P1`, `P1.M1`, `P1.M1.E1.T001`, `B001`, `I001`, `F001`) that
//! every entity in the tree is addressed by. Orderings are numeric by
//! segment, never lexical, so `T002 < T010`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{BacklogError, Result};

/// Minimum zero-padding width for task/bug/idea/fix numeric segments.
pub const TASK_PAD_WIDTH: usize = 3;

/// A structured, hierarchical identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathId {
    Phase(u32),
    Milestone(u32, u32),
    Epic(u32, u32, u32),
    Task(u32, u32, u32, u32),
    Bug(u32),
    Idea(u32),
    Fix(u32),
}

/// Fixed kind ordering used to break ties between different entity kinds:
/// Phase < Milestone < Epic < Task < Bug < Idea < Fix.
fn kind_rank(id: &PathId) -> u8 {
    match id {
        PathId::Phase(_) => 0,
        PathId::Milestone(..) => 1,
        PathId::Epic(..) => 2,
        PathId::Task(..) => 3,
        PathId::Bug(_) => 4,
        PathId::Idea(_) => 5,
        PathId::Fix(_) => 6,
    }
}

impl PathId {
    /// The enclosing container's id, or `None` for a phase or an auxiliary entity.
    pub fn parent(&self) -> Option<PathId> {
        match self {
            PathId::Phase(_) | PathId::Bug(_) | PathId::Idea(_) | PathId::Fix(_) => None,
            PathId::Milestone(p, _) => Some(PathId::Phase(*p)),
            PathId::Epic(p, m, _) => Some(PathId::Milestone(*p, *m)),
            PathId::Task(p, m, e, _) => Some(PathId::Epic(*p, *m, *e)),
        }
    }

    pub fn is_task_like(&self) -> bool {
        matches!(
            self,
            PathId::Task(..) | PathId::Bug(_) | PathId::Idea(_) | PathId::Fix(_)
        )
    }

    pub fn is_container(&self) -> bool {
        matches!(self, PathId::Phase(_) | PathId::Milestone(..) | PathId::Epic(..))
    }

    /// Whether `self` is a prefix ancestor of (or equal to) `other` in the
    /// primary hierarchy. Auxiliary kinds only match themselves.
    pub fn is_prefix(&self, other: &PathId) -> bool {
        if self == other {
            return true;
        }
        let mut cursor = other.parent();
        while let Some(ref p) = cursor {
            if p == self {
                return true;
            }
            cursor = p.parent();
        }
        false
    }

    /// Scope-pattern match: `pattern` is either a plain id (prefix match), or
    /// ends in `.*`/`*` for a wildcard tail match against the same prefix.
    pub fn matches_pattern(&self, pattern: &str) -> bool {
        if let Some(base) = pattern.strip_suffix(".*") {
            match PathId::parse(base) {
                Ok(base_id) => base_id.is_prefix(self),
                Err(_) => false,
            }
        } else if pattern == "*" {
            true
        } else {
            match PathId::parse(pattern) {
                Ok(pattern_id) => pattern_id.is_prefix(self),
                Err(_) => false,
            }
        }
    }

    pub fn parse(s: &str) -> Result<PathId> {
        let s = s.trim();
        if let Some(rest) = s.strip_prefix('B') {
            return parse_aux(rest, s).map(PathId::Bug);
        }
        if let Some(rest) = s.strip_prefix('I') {
            return parse_aux(rest, s).map(PathId::Idea);
        }
        if let Some(rest) = s.strip_prefix('F') {
            return parse_aux(rest, s).map(PathId::Fix);
        }
        if let Some(rest) = s.strip_prefix('P') {
            let segments: Vec<&str> = s.split('.').collect();
            return parse_primary(&segments, rest, s);
        }
        Err(BacklogError::InvalidId(s.to_string()))
    }
}

fn parse_aux(rest: &str, whole: &str) -> Result<u32> {
    if rest.len() < TASK_PAD_WIDTH || !rest.chars().all(|c| c.is_ascii_digit()) {
        return Err(BacklogError::InvalidId(whole.to_string()));
    }
    rest.parse::<u32>()
        .map_err(|_| BacklogError::InvalidId(whole.to_string()))
}

fn parse_primary(segments: &[&str], phase_rest: &str, whole: &str) -> Result<PathId> {
    let invalid = || BacklogError::InvalidId(whole.to_string());

    let phase = parse_numeric_segment(phase_rest).ok_or_else(invalid)?;
    match segments.len() {
        1 => Ok(PathId::Phase(phase)),
        2 => {
            let m = segments[1].strip_prefix('M').ok_or_else(invalid)?;
            let m = parse_numeric_segment(m).ok_or_else(invalid)?;
            Ok(PathId::Milestone(phase, m))
        }
        3 => {
            let m = segments[1].strip_prefix('M').ok_or_else(invalid)?;
            let m = parse_numeric_segment(m).ok_or_else(invalid)?;
            let e = segments[2].strip_prefix('E').ok_or_else(invalid)?;
            let e = parse_numeric_segment(e).ok_or_else(invalid)?;
            Ok(PathId::Epic(phase, m, e))
        }
        4 => {
            let m = segments[1].strip_prefix('M').ok_or_else(invalid)?;
            let m = parse_numeric_segment(m).ok_or_else(invalid)?;
            let e = segments[2].strip_prefix('E').ok_or_else(invalid)?;
            let e = parse_numeric_segment(e).ok_or_else(invalid)?;
            let t = segments[3].strip_prefix('T').ok_or_else(invalid)?;
            if t.len() < TASK_PAD_WIDTH || !t.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid());
            }
            let t: u32 = t.parse().map_err(|_| invalid())?;
            Ok(PathId::Task(phase, m, e, t))
        }
        _ => Err(invalid()),
    }
}

fn parse_numeric_segment(s: &str) -> Option<u32> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl FromStr for PathId {
    type Err = BacklogError;
    fn from_str(s: &str) -> Result<Self> {
        PathId::parse(s)
    }
}

impl fmt::Display for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathId::Phase(p) => write!(f, "P{p}"),
            PathId::Milestone(p, m) => write!(f, "P{p}.M{m}"),
            PathId::Epic(p, m, e) => write!(f, "P{p}.M{m}.E{e}"),
            PathId::Task(p, m, e, t) => write!(f, "P{p}.M{m}.E{e}.T{t:0width$}", width = TASK_PAD_WIDTH),
            PathId::Bug(n) => write!(f, "B{n:0width$}", width = TASK_PAD_WIDTH),
            PathId::Idea(n) => write!(f, "I{n:0width$}", width = TASK_PAD_WIDTH),
            PathId::Fix(n) => write!(f, "F{n:0width$}", width = TASK_PAD_WIDTH),
        }
    }
}

impl PartialOrd for PathId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PathId {
    fn cmp(&self, other: &Self) -> Ordering {
        use PathId::*;
        match (self, other) {
            (Phase(a), Phase(b)) => a.cmp(b),
            (Milestone(ap, am), Milestone(bp, bm)) => ap.cmp(bp).then(am.cmp(bm)),
            (Epic(ap, am, ae), Epic(bp, bm, be)) => ap.cmp(bp).then(am.cmp(bm)).then(ae.cmp(be)),
            (Task(ap, am, ae, at), Task(bp, bm, be, bt)) => ap
                .cmp(bp)
                .then(am.cmp(bm))
                .then(ae.cmp(be))
                .then(at.cmp(bt)),
            (Bug(a), Bug(b)) => a.cmp(b),
            (Idea(a), Idea(b)) => a.cmp(b),
            (Fix(a), Fix(b)) => a.cmp(b),
            _ => kind_rank(self).cmp(&kind_rank(other)),
        }
    }
}

/// Custom serde support: Path IDs serialize/deserialize as their string form.
impl serde::Serialize for PathId {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for PathId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PathId::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_primary_forms() {
        assert_eq!(PathId::parse("P1").unwrap(), PathId::Phase(1));
        assert_eq!(PathId::parse("P1.M2").unwrap(), PathId::Milestone(1, 2));
        assert_eq!(PathId::parse("P1.M2.E3").unwrap(), PathId::Epic(1, 2, 3));
        assert_eq!(
            PathId::parse("P1.M2.E3.T004").unwrap(),
            PathId::Task(1, 2, 3, 4)
        );
    }

    #[test]
    fn parses_auxiliary_forms() {
        assert_eq!(PathId::parse("B001").unwrap(), PathId::Bug(1));
        assert_eq!(PathId::parse("I042").unwrap(), PathId::Idea(42));
        assert_eq!(PathId::parse("F007").unwrap(), PathId::Fix(7));
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(PathId::parse("X1").is_err());
        assert!(PathId::parse("P1.E1").is_err());
        assert!(PathId::parse("P1.M1.E1.T1").is_err()); // under-padded
        assert!(PathId::parse("").is_err());
    }

    #[test]
    fn display_round_trips_parse() {
        for s in ["P1", "P1.M2", "P1.M2.E3", "P1.M2.E3.T004", "B001", "I042", "F007"] {
            let id = PathId::parse(s).unwrap();
            assert_eq!(id.to_string(), s);
        }
    }

    #[test]
    fn task_ids_order_numerically_not_lexically() {
        let t2 = PathId::parse("P1.M1.E1.T002").unwrap();
        let t10 = PathId::parse("P1.M1.E1.T010").unwrap();
        assert!(t2 < t10);
    }

    #[test]
    fn kind_rank_breaks_ties_phase_before_bug() {
        let phase = PathId::Phase(1);
        let bug = PathId::Bug(1);
        assert!(phase < bug);
    }

    #[test]
    fn parent_chain_walks_up_to_phase() {
        let task = PathId::parse("P1.M2.E3.T004").unwrap();
        let epic = task.parent().unwrap();
        assert_eq!(epic, PathId::Epic(1, 2, 3));
        let milestone = epic.parent().unwrap();
        assert_eq!(milestone, PathId::Milestone(1, 2));
        let phase = milestone.parent().unwrap();
        assert_eq!(phase, PathId::Phase(1));
        assert!(phase.parent().is_none());
    }

    #[test]
    fn auxiliary_entities_have_no_parent() {
        assert!(PathId::Bug(1).parent().is_none());
        assert!(PathId::Idea(1).parent().is_none());
        assert!(PathId::Fix(1).parent().is_none());
    }

    #[test]
    fn is_prefix_matches_ancestors_and_self() {
        let epic = PathId::parse("P1.M1.E1").unwrap();
        let task = PathId::parse("P1.M1.E1.T001").unwrap();
        let other_epic = PathId::parse("P1.M1.E2").unwrap();
        assert!(epic.is_prefix(&task));
        assert!(epic.is_prefix(&epic));
        assert!(!other_epic.is_prefix(&task));
    }

    #[test]
    fn scope_pattern_wildcard_tail() {
        let task = PathId::parse("P1.M1.E1.T001").unwrap();
        assert!(task.matches_pattern("P1.*"));
        assert!(task.matches_pattern("P1.M1.*"));
        assert!(!task.matches_pattern("P2.*"));
        assert!(task.matches_pattern("P1.M1.E1.T001"));
        assert!(task.matches_pattern("*"));
    }

    #[test]
    fn serde_round_trip_via_string() {
        let id = PathId::parse("P1.M1.E1.T001").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"P1.M1.E1.T001\"");
        let back: PathId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
