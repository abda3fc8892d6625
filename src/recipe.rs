//! # Recipe loading
//!
//! A recipe is a small line-oriented text file:
//!
//! ```text
//! # comment line
//! cycles = 2          # inline comments are stripped
//! diameter = 7.0      # syringe inner diameter in mm
//! PHN 1
//! FUN RAT
//! RAT 1000 UM
//! ```
//!
//! Every line that is not a comment, a blank line or one of the two fields is
//! a command and is sent to the pump verbatim, in file order.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::RecipeError;

/// How `cycles` and `diameter` lines are recognised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldMatching {
    /// The trimmed text left of the first `=` must equal the field name.
    #[default]
    Anchored,
    /// Any line containing the field name is that field, `cycles` first.
    /// Matches files written for the older loader, including its quirk of
    /// swallowing commands like `SET cyclesmode ON`.
    Substring,
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Cycles,
    Diameter,
}

impl Field {
    fn name(self) -> &'static str {
        match self {
            Field::Cycles => "cycles",
            Field::Diameter => "diameter",
        }
    }
}

/// A validated pump program: how often to replay which commands, and the
/// syringe the rates are computed for.
#[derive(Debug, Clone, PartialEq)]
pub struct Recipe {
    cycles: u32,
    diameter: f64,
    commands: Vec<String>,
}

impl Recipe {
    /// Builds a recipe in memory, enforcing the same rules as [`Recipe::parse`].
    pub fn new<I, S>(cycles: u32, diameter: f64, commands: I) -> Result<Self, RecipeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let commands = commands
            .into_iter()
            .map(Into::into)
            .map(|command: String| {
                let trimmed = command.trim();
                if trimmed.is_empty() || trimmed.contains(['\r', '\n']) {
                    Err(RecipeError::InvalidCommand(command))
                } else {
                    Ok(trimmed.to_string())
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::validated(Some(cycles), Some(diameter), commands)
    }

    /// Reads and parses the recipe file at `path` with anchored field matching.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RecipeError> {
        Self::load_with(path, FieldMatching::default())
    }

    pub fn load_with(path: impl AsRef<Path>, matching: FieldMatching) -> Result<Self, RecipeError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| RecipeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let recipe = Self::parse_with(&text, matching)?;
        tracing::info!(
            path = %path.display(),
            cycles = recipe.cycles,
            diameter = recipe.diameter,
            commands = recipe.commands.len(),
            "loaded recipe"
        );
        Ok(recipe)
    }

    /// Parses recipe text with anchored field matching.
    pub fn parse(text: &str) -> Result<Self, RecipeError> {
        Self::parse_with(text, FieldMatching::default())
    }

    pub fn parse_with(text: &str, matching: FieldMatching) -> Result<Self, RecipeError> {
        let mut cycles = None;
        let mut diameter = None;
        let mut commands = Vec::new();

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            if raw.starts_with('#') {
                continue;
            }
            // Inline comment.
            let line = raw.split('#').next().unwrap_or_default();

            match classify(line, matching) {
                Some((field, value)) => {
                    let value = value.ok_or(RecipeError::MissingValue {
                        line: line_no,
                        field: field.name(),
                    })?;
                    match field {
                        Field::Cycles => cycles = Some(parse_cycles(value, line_no)?),
                        Field::Diameter => diameter = Some(parse_diameter(value, line_no)?),
                    }
                }
                None => {
                    let command = line.trim();
                    // `lines()` leaves a carriage return that is not part of a
                    // line ending; it would split the command on the wire.
                    if command.contains('\r') {
                        return Err(RecipeError::InvalidCommand(command.to_string()));
                    }
                    if !command.is_empty() {
                        commands.push(command.to_string());
                    }
                }
            }
        }

        Self::validated(cycles, diameter, commands)
    }

    fn validated(
        cycles: Option<u32>,
        diameter: Option<f64>,
        commands: Vec<String>,
    ) -> Result<Self, RecipeError> {
        let cycles = cycles.ok_or(RecipeError::MissingCycles)?;
        let diameter = diameter.ok_or(RecipeError::MissingDiameter)?;
        if cycles == 0 {
            return Err(RecipeError::ZeroCycles);
        }
        if !diameter.is_finite() || diameter <= 0.0 {
            return Err(RecipeError::DiameterOutOfRange(diameter));
        }
        if commands.is_empty() {
            return Err(RecipeError::NoCommands);
        }
        Ok(Self {
            cycles,
            diameter,
            commands,
        })
    }

    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Syringe inner diameter in millimetres.
    pub fn diameter(&self) -> f64 {
        self.diameter
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// The `DIA` command that programs this recipe's syringe diameter.
    ///
    /// Whole numbers keep one decimal place (`DIA7.0`), anything else is
    /// printed in its shortest form (`DIA14.43`).
    pub fn diameter_command(&self) -> String {
        if self.diameter.fract() == 0.0 {
            format!("DIA{:.1}", self.diameter)
        } else {
            format!("DIA{}", self.diameter)
        }
    }
}

/// Returns the field a line assigns, with the text after its first `=` if
/// there is one. `None` means the line is a command.
fn classify(line: &str, matching: FieldMatching) -> Option<(Field, Option<&str>)> {
    match matching {
        FieldMatching::Anchored => {
            let (key, value) = line.split_once('=')?;
            let field = match key.trim() {
                "cycles" => Field::Cycles,
                "diameter" => Field::Diameter,
                _ => return None,
            };
            Some((field, Some(value)))
        }
        FieldMatching::Substring => {
            let field = if line.contains("cycles") {
                Field::Cycles
            } else if line.contains("diameter") {
                Field::Diameter
            } else {
                return None;
            };
            Some((field, line.split_once('=').map(|(_, value)| value)))
        }
    }
}

fn parse_cycles(value: &str, line: usize) -> Result<u32, RecipeError> {
    let value = value.trim();
    value.parse().map_err(|source| RecipeError::InvalidCycles {
        line,
        value: value.to_string(),
        source,
    })
}

fn parse_diameter(value: &str, line: usize) -> Result<f64, RecipeError> {
    let value = value.trim();
    value.parse().map_err(|source| RecipeError::InvalidDiameter {
        line,
        value: value.to_string(),
        source,
    })
}
