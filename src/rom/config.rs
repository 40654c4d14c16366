//! Configuration of the reduced-order model evaluator.
use crate::rom::dirichlet::DirichletValueParameters;
use crate::rom::preconditioner::{PreconditionerMode, RecomputePolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

fn default_true() -> bool {
    true
}

fn default_output_directory() -> PathBuf {
    PathBuf::from(".")
}

/// Diagnostic output written by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutputFlags {
    /// Log the progress of every evaluation at `info` level instead of `debug`.
    #[serde(rename = "Output Trace", default)]
    pub trace: bool,
    #[serde(rename = "Write Jacobian", default)]
    pub jacobian: bool,
    #[serde(rename = "Write Residual", default)]
    pub residual: bool,
    #[serde(rename = "Write Solution", default)]
    pub solution: bool,
    #[serde(rename = "Write Preconditioner", default)]
    pub preconditioner: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RomParameters {
    #[serde(rename = "Preconditioner Type", default)]
    pub preconditioner: PreconditionerMode,
    #[serde(rename = "Preconditioner Recompute Policy", default)]
    pub recompute_policy: RecomputePolicy,
    /// Whether the full-order model enforces Dirichlet conditions itself. Otherwise the evaluator
    /// enforces them on the full residual and Jacobian.
    #[serde(rename = "Apply BCs", default = "default_true")]
    pub full_order_applies_bcs: bool,
    #[serde(rename = "Run nan Check", default = "default_true")]
    pub run_nan_check: bool,
    #[serde(rename = "Run singular Check", default = "default_true")]
    pub run_singular_check: bool,
    /// Build the preconditioner from the Jacobian before Dirichlet enforcement, and enforce the
    /// conditions on the preconditioner instead.
    #[serde(rename = "Precondition Full Jacobian", default)]
    pub precondition_full_jacobian: bool,
    /// Number of leading reduced modes carrying the Dirichlet data.
    #[serde(rename = "Number of DBC Modes", default)]
    pub num_dbc_modes: usize,
    #[serde(rename = "Output Directory", default = "default_output_directory")]
    pub output_directory: PathBuf,
    #[serde(rename = "Output", default)]
    pub output: OutputFlags,
    /// Skips the full Jacobian in the very first step, where thermo-mechanical models are not
    /// yet consistent.
    #[serde(rename = "Thermo-Mechanical", default)]
    pub thermo_mechanical: bool,
    #[serde(rename = "Dirichlet BCs", default)]
    pub dirichlet: BTreeMap<String, DirichletValueParameters>,
}

impl Default for RomParameters {
    fn default() -> Self {
        Self {
            preconditioner: PreconditionerMode::default(),
            recompute_policy: RecomputePolicy::default(),
            full_order_applies_bcs: true,
            run_nan_check: true,
            run_singular_check: true,
            precondition_full_jacobian: false,
            num_dbc_modes: 0,
            output_directory: default_output_directory(),
            output: OutputFlags::default(),
            thermo_mechanical: false,
            dirichlet: BTreeMap::new(),
        }
    }
}
