use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Applied,
    Reverted,
    /// The ledger already records the version; nothing was executed.
    AlreadyApplied,
    /// Dry run: statements were logged, not executed.
    Planned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationResult {
    pub version: i64,
    pub name: String,
    pub direction: Direction,
    pub outcome: StepOutcome,
}

/// One line of `status` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub version: i64,
    /// `None` when the ledger records a version no migration defines.
    pub name: Option<String>,
    pub direction: Direction,
}
