use crate::utils::{FlowError, Result};
use oxc_transformer::{ArrowFunctionsOptions, EnvOptions, HelperLoaderMode, TransformOptions};

/// How far below the transformer's own output a bundle must be lowered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lowering {
    /// The transformer's per-engine passes are enough.
    None,
    /// At least one target lacks full ES2015 support, so the bundle must be ES5.
    Es5,
}

type Version = (u32, u32, u32);

/// First release of each engine that ships the whole of ES2015 (classes,
/// arrows, block scoping, destructuring, spread, for-of, templates).
const FULL_ES2015: &[(&str, Version)] = &[
    ("chrome", (62, 0, 0)),
    ("edge", (79, 0, 0)),
    ("firefox", (53, 0, 0)),
    ("safari", (16, 3, 0)),
    ("ios", (16, 3, 0)),
    ("node", (8, 10, 0)),
    ("opera", (49, 0, 0)),
    ("samsung", (8, 0, 0)),
    ("electron", (3, 0, 0)),
    ("android", (62, 0, 0)),
    ("opera_mobile", (49, 0, 0)),
    ("deno", (0, 0, 0)),
];

/// Engines that never got full ES2015.
const ES5_ONLY: &[&str] = &["ie", "ie_mob", "hermes", "rhino"];

/// The validated target list of a bundle.
#[derive(Clone, Debug)]
pub struct TargetPlan {
    targets: Vec<String>,
    lowering: Lowering,
}

impl TargetPlan {
    pub fn new(targets: &[String]) -> Result<Self> {
        let targets: Vec<String> = targets
            .iter()
            .map(|target| target.trim().to_ascii_lowercase())
            .filter(|target| !target.is_empty())
            .collect();

        let engines = engine_targets(&targets);
        if !engines.is_empty() {
            TransformOptions::from_target_list(&engines)
                .map_err(|error| FlowError::config(format!("invalid build target: {}", error)))?;
        }

        let mut lowering = Lowering::None;
        for target in &targets {
            if needs_es5(target)? {
                lowering = Lowering::Es5;
            }
        }

        Ok(Self { targets, lowering })
    }

    pub fn lowering(&self) -> Lowering {
        self.lowering
    }

    /// Whether the bundle may reference `babelHelpers`.
    pub fn helpers(&self) -> bool {
        !self.targets.is_empty()
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Transformer options for the whole bundle, or `None` when no targets
    /// were configured.
    pub fn transform_options(&self) -> Result<Option<TransformOptions>> {
        if self.targets.is_empty() {
            return Ok(None);
        }

        let engines = engine_targets(&self.targets);
        let mut options = if engines.is_empty() {
            TransformOptions::default()
        } else {
            TransformOptions::from_target_list(&engines)
                .map_err(|error| FlowError::config(format!("invalid build target: {}", error)))?
        };
        options.helper_loader.mode = HelperLoaderMode::External;

        if self.lowering == Lowering::Es5 {
            force_es5_passes(&mut options.env);
        }
        Ok(Some(options))
    }
}

/// Turns on every transformer pass whose output is ES5. Async functions and
/// generators stay as they are so the output check rejects them.
fn force_es5_passes(env: &mut EnvOptions) {
    let all = EnvOptions::enable_all(false);
    env.regexp = all.regexp;
    env.es2015.arrow_function = Some(ArrowFunctionsOptions::default());
    env.es2016.exponentiation_operator = true;
    env.es2017.async_to_generator = false;
    env.es2018.object_rest_spread = all.es2018.object_rest_spread;
    env.es2018.async_generator_functions = false;
    env.es2019.optional_catch_binding = true;
    env.es2020.nullish_coalescing_operator = true;
    env.es2020.optional_chaining = true;
    env.es2021.logical_assignment_operators = true;
}

/// Targets the transformer understands; `es5` is handled here only.
fn engine_targets(targets: &[String]) -> Vec<String> {
    targets.iter().filter(|target| target.as_str() != "es5").cloned().collect()
}

fn needs_es5(target: &str) -> Result<bool> {
    if target == "es5" {
        return Ok(true);
    }
    if target == "esnext" || (target.len() > 2 && target.starts_with("es") && target[2..].chars().all(|c| c.is_ascii_digit())) {
        return Ok(false);
    }

    let split = target.find(|c: char| c.is_ascii_digit()).unwrap_or(target.len());
    let (engine, version) = target.split_at(split);
    if ES5_ONLY.contains(&engine) {
        return Ok(true);
    }

    let full = FULL_ES2015
        .iter()
        .find(|(name, _)| *name == engine)
        .map(|(_, version)| *version)
        .ok_or_else(|| FlowError::config(format!("unknown build target engine '{}'", target)))?;
    Ok(parse_version(target, version)? < full)
}

fn parse_version(target: &str, version: &str) -> Result<Version> {
    let mut parts = [0u32; 3];
    for (index, part) in version.split('.').enumerate() {
        if index >= parts.len() {
            break;
        }
        parts[index] = part
            .parse()
            .map_err(|_| FlowError::config(format!("invalid version in build target '{}'", target)))?;
    }
    Ok((parts[0], parts[1], parts[2]))
}
