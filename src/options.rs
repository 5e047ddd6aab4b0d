//! The merged view over startup flags and the current dream> command.
//!
//! `Options` owns one record from each parser. Reads consult the command
//! record first and fall back to the startup record; writes always land in
//! the command record, so a written name shadows the startup value until the
//! next command replaces the record.

use log::debug;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::args::StartupArgs;
use crate::cli::CommandArgs;
use crate::error::ArgsError;

#[derive(Debug, Clone)]
pub struct Options {
    arg_switches: StartupArgs,
    cmd_switches: CommandArgs,
}

impl Options {
    /// Build from already parsed startup flags. The command record starts
    /// out as the parse of an empty line.
    pub fn new(startup: StartupArgs) -> Result<Self, ArgsError> {
        Ok(Self {
            arg_switches: startup,
            cmd_switches: CommandArgs::parse_line("")?,
        })
    }

    /// Replace the startup record by parsing shell arguments (binary name first).
    pub fn parse_args_from<I, S>(&mut self, itr: I) -> Result<&StartupArgs, ArgsError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arg_switches = StartupArgs::try_parse_shell(itr)?;
        Ok(&self.arg_switches)
    }

    /// Parse a dream> command line and make it the current command record.
    ///
    /// On failure the previous record is kept.
    pub fn parse_cmd(&mut self, line: &str) -> Result<&CommandArgs, ArgsError> {
        match CommandArgs::parse_line(line) {
            Ok(cmd) => {
                self.cmd_switches = cmd;
                Ok(&self.cmd_switches)
            }
            Err(e) => {
                debug!("Rejected command {:?}: {}", line, e);
                Err(e)
            }
        }
    }

    pub fn startup(&self) -> &StartupArgs {
        &self.arg_switches
    }

    pub fn command(&self) -> &CommandArgs {
        &self.cmd_switches
    }

    /// Look up a field, command record first.
    pub fn get(&self, name: &str) -> Result<Value, ArgsError> {
        if let Some(value) = to_map(&self.cmd_switches)?.remove(name) {
            return Ok(value);
        }
        to_map(&self.arg_switches)?
            .remove(name)
            .ok_or_else(|| ArgsError::UnknownField(name.to_string()))
    }

    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<T, ArgsError> {
        serde_json::from_value(self.get(name)?).map_err(|source| ArgsError::Field {
            name: name.to_string(),
            source,
        })
    }

    /// Write a field into the command record.
    ///
    /// Declared command fields are type checked; any other name is kept
    /// alongside them until the next [`Options::parse_cmd`].
    pub fn set<V: Serialize>(&mut self, name: &str, value: V) -> Result<(), ArgsError> {
        if name.starts_with('_') {
            return Err(ArgsError::InternalField(name.to_string()));
        }
        let mut record = to_map(&self.cmd_switches)?;
        record.insert(name.to_string(), serde_json::to_value(value)?);
        self.cmd_switches =
            serde_json::from_value(Value::Object(record)).map_err(|source| ArgsError::Field {
                name: name.to_string(),
                source,
            })?;
        Ok(())
    }

    /// The effective configuration: startup fields overlaid with command
    /// fields, then with `overrides`. Neither record is modified.
    pub fn to_dict(&self, overrides: &[(&str, Value)]) -> Result<Map<String, Value>, ArgsError> {
        let mut dict = to_map(&self.arg_switches)?;
        dict.extend(to_map(&self.cmd_switches)?);
        dict.extend(
            overrides
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone())),
        );
        Ok(dict)
    }

    pub fn json(&self, overrides: &[(&str, Value)]) -> Result<String, ArgsError> {
        Ok(serde_json::to_string(&self.to_dict(overrides)?)?)
    }

    /// Normalized prompt: the effective command rendered back into switches.
    ///
    /// `-S` is written only once a seed is known (from the command or an
    /// override); an unseeded command has nothing to put there.
    pub fn prompt_str(&self, overrides: &[(&str, Value)]) -> Result<String, ArgsError> {
        let a: CommandArgs = serde_json::from_value(Value::Object(self.to_dict(overrides)?))?;

        // Floats use Debug so whole numbers keep their ".0".
        let mut switches = vec![
            format!("\"{}\"", escape_prompt(&a.prompt)),
            format!("-s {}", a.steps),
            format!("-W {}", a.width),
            format!("-H {}", a.height),
            format!("-C {:?}", a.cfg_scale),
            format!("-A {}", a.sampler_name),
        ];
        if let Some(seed) = a.seed {
            switches.push(format!("-S {}", seed));
        }
        if a.output.seamless {
            switches.push("--seamless".to_string());
        }
        if !a.init_img.is_empty() {
            switches.push(format!("-I {}", a.init_img));
        }
        if a.fit {
            switches.push("--fit".to_string());
        }
        if a.strength != 0.0 && !a.init_img.is_empty() {
            switches.push(format!("-f {:?}", a.strength));
        }
        if a.gfpgan_strength != 0.0 {
            switches.push(format!("-G {:?}", a.gfpgan_strength));
        }
        if let Some(upscale) = &a.upscale
            && !upscale.is_empty()
        {
            switches.push(format!("-U {}", join_floats(upscale)));
        }
        if let Some(embiggen) = &a.embiggen
            && !embiggen.is_empty()
        {
            switches.push(format!("--embiggen {}", join_floats(embiggen)));
        }
        if let Some(tiles) = &a.embiggen_tiles
            && !tiles.is_empty()
        {
            let tiles: Vec<String> = tiles.iter().map(|t| t.to_string()).collect();
            switches.push(format!("--embiggen_tiles {}", tiles.join(" ")));
        }
        if a.variation_amount > 0.0 {
            switches.push(format!("-v {:?}", a.variation_amount));
        }
        if !a.with_variations.is_empty() {
            let pairs: Vec<String> = a.with_variations.iter().map(|p| p.to_string()).collect();
            switches.push(format!("-V {}", pairs.join(",")));
        }
        Ok(switches.join(" "))
    }
}

fn to_map<T: Serialize>(record: &T) -> Result<Map<String, Value>, ArgsError> {
    Ok(serde_json::from_value(serde_json::to_value(record)?)?)
}

fn join_floats(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format!("{:?}", v))
        .collect::<Vec<_>>()
        .join(" ")
}

fn escape_prompt(prompt: &str) -> String {
    prompt.replace('\\', "\\\\").replace('"', "\\\"")
}
