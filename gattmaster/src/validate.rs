use std::fmt;

use gattmaster_proto::{Action, ActionTag, CommandTable};

/// Whether an action can run against the compiled table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Runnable,
    /// Required rows absent from the table, in registry order
    MissingTableEntry(Vec<ActionTag>),
    /// The action needs table rows but no commands file was given
    NoTableLoaded,
}

impl Validation {
    pub fn is_runnable(&self) -> bool {
        matches!(self, Validation::Runnable)
    }
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validation::Runnable => f.write_str("runnable"),
            Validation::MissingTableEntry(missing) => {
                let rows: Vec<_> = missing.iter().map(|tag| tag.name()).collect();
                write!(
                    f,
                    "Missing parameters in commands file for the selected action ({}), exiting.",
                    rows.join(", ")
                )
            }
            Validation::NoTableLoaded => f.write_str(
                "You have to specify the commands input file for the selected action, exiting.",
            ),
        }
    }
}

pub fn validate(action: Action, table: Option<&CommandTable>) -> Validation {
    let required = action.spec().required;
    if required.is_empty() {
        return Validation::Runnable;
    }

    let Some(table) = table else {
        return Validation::NoTableLoaded;
    };

    let missing: Vec<ActionTag> = required
        .iter()
        .copied()
        .filter(|tag| !table.contains(*tag))
        .collect();

    if missing.is_empty() {
        Validation::Runnable
    } else {
        Validation::MissingTableEntry(missing)
    }
}
