/*!
 * Remote layout.
 *
 * A fixed grid placing command IDs on the hub's remote-control screen.
 */
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::{ids, CommandDescriptor, CommandId};
use crate::error::{Error, Result};

/// Grid value the hub uses for an empty slot
pub const EMPTY_SLOT: i64 = -1;

/// One cell of the remote layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Slot {
    /// Nothing is shown here
    Empty,
    /// The command with this ID is shown here
    Command(CommandId),
}

impl Slot {
    /// The hub representation of this slot
    pub fn to_hub_value(self) -> i64 {
        match self {
            Slot::Empty => EMPTY_SLOT,
            Slot::Command(id) => i64::from(id),
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Empty => write!(f, "-"),
            Slot::Command(id) => write!(f, "{}", id),
        }
    }
}

use Slot::{Command as C, Empty as E};

const STANDARD_ROWS: [[Slot; 3]; 6] = [
    [C(ids::TURN_ON), E, C(ids::TURN_OFF)],
    [E, C(ids::UP), E],
    [C(ids::LEFT), C(ids::SELECT), C(ids::RIGHT)],
    [E, C(ids::DOWN), E],
    [C(ids::PLAY_PAUSE), C(ids::BACK), C(ids::HOME)],
    [C(ids::VOLUME_DOWN), E, C(ids::VOLUME_UP)],
];

/// A rectangular grid of slots, listed row by row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteLayout {
    rows: Vec<Vec<Slot>>,
}

impl RemoteLayout {
    /// Create a layout from its rows
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] if the grid is empty or its rows differ in length.
    pub fn new(rows: Vec<Vec<Slot>>) -> Result<Self> {
        let width = rows.first().map(Vec::len).unwrap_or(0);
        if width == 0 {
            return Err(Error::validation("remote layout must not be empty"));
        }
        if let Some((index, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != width) {
            return Err(Error::validation(format!(
                "remote layout row {} has {} slots, expected {}",
                index,
                row.len(),
                width
            )));
        }
        Ok(Self { rows })
    }

    /// The media-remote layout, 3 slots wide and 6 rows high
    pub fn standard() -> Self {
        Self {
            rows: STANDARD_ROWS.iter().map(|row| row.to_vec()).collect(),
        }
    }

    /// Width and height of the grid
    pub fn size(&self) -> (usize, usize) {
        (self.rows.first().map(Vec::len).unwrap_or(0), self.rows.len())
    }

    /// The rows of the grid
    pub fn rows(&self) -> &[Vec<Slot>] {
        &self.rows
    }

    /// Every command ID placed on the grid
    pub fn command_ids(&self) -> impl Iterator<Item = CommandId> + '_ {
        self.rows.iter().flatten().filter_map(|slot| match slot {
            Slot::Command(id) => Some(*id),
            Slot::Empty => None,
        })
    }

    /// The grid as the hub expects it, empty slots as [`EMPTY_SLOT`]
    pub fn to_hub_grid(&self) -> Vec<Vec<i64>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(|slot| slot.to_hub_value()).collect())
            .collect()
    }

    /// Check that every placed command exists in `commands`
    pub fn validate_against(&self, commands: &[CommandDescriptor]) -> Result<()> {
        match self
            .command_ids()
            .find(|id| !commands.iter().any(|command| command.id() == *id))
        {
            Some(unknown) => Err(Error::validation(format!(
                "remote layout references unknown command {}",
                unknown
            ))),
            None => Ok(()),
        }
    }
}

impl Default for RemoteLayout {
    fn default() -> Self {
        Self::standard()
    }
}
