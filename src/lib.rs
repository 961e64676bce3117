// SPDX-License-Identifier: Apache-2.0

//! Synthesis of the Cairo utility functions needed when compiling Solidity to Starknet.
//!
//! Code generation for a contract calls into [`utilgen::CairoUtilFuncGen`] whenever it needs
//! a routine for a type shape, for example copying a `uint8[]` from storage to memory, and
//! gets back the name of the routine. Once the contract has been generated, the synthesized
//! routines and their imports form one Cairo module.

pub mod abi;
pub mod cairo;
pub mod layout;
pub mod sema;
pub mod utilgen;

pub use solang_parser as parser;

use cairo::imports::{format_imports, ImportMap};
use layout::ArrayLayout;
use sema::ast::{Diagnostic, Namespace};
use serde_derive::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};
use utilgen::{CairoUtilFuncGen, Options};

/// The target you want to compile Solidity for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// Starknet, see <https://starknet.io/>
    #[default]
    Starknet,
    /// Starknet, with dynamic array elements and mapping slots allocated on first use
    StarknetIndexed,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Target::Starknet => write!(f, "starknet"),
            Target::StarknetIndexed => write!(f, "starknet_indexed"),
        }
    }
}

impl Target {
    /// Creates a target from a string
    pub fn from(name: &str) -> Option<Self> {
        match name {
            "starknet" => Some(Target::Starknet),
            "starknet_indexed" => Some(Target::StarknetIndexed),
            _ => None,
        }
    }

    /// How storage dynamic arrays and mappings address their elements
    pub fn array_layout(&self) -> ArrayLayout {
        match self {
            Target::Starknet => ArrayLayout::Strided,
            Target::StarknetIndexed => ArrayLayout::Indexed,
        }
    }
}

/// The contents of a `solcairo.toml` file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Configuration {
    pub target: Target,
    pub options: Options,
}

impl Configuration {
    pub fn from_toml(contents: &str) -> Result<Self, String> {
        toml::from_str(contents).map_err(|e| format!("invalid configuration: {}", e.message()))
    }
}

/// The Cairo module of everything synthesized in one compilation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedModule {
    pub imports: ImportMap,
    pub code: String,
}

impl SynthesizedModule {
    /// The module source: the import block, then the declarations
    pub fn render(&self) -> String {
        let imports = format_imports(&self.imports);

        match (imports.is_empty(), self.code.is_empty()) {
            (true, _) => self.code.clone(),
            (false, true) => imports,
            (false, false) => format!("{imports}\n\n{}", self.code),
        }
    }
}

/// Run one compilation: `build` requests whatever routines it needs from a fresh set of
/// generators. If any request fails the diagnostic is added to the namespace and no module is
/// produced.
pub fn synthesize<F>(ns: &mut Namespace, opt: &Options, build: F) -> Option<SynthesizedModule>
where
    F: FnOnce(&CairoUtilFuncGen, &Namespace) -> Result<(), Diagnostic>,
{
    let gen = CairoUtilFuncGen::new(opt);

    if let Err(diagnostic) = build(&gen, ns) {
        debug!(message = %diagnostic.message, "synthesis aborted");

        ns.diagnostics.push(diagnostic);

        return None;
    }

    let module = SynthesizedModule {
        imports: gen.collect_imports(),
        code: gen.emit(),
    };

    info!(
        layout = %ns.target.array_layout(),
        modules = module.imports.len(),
        "utility functions synthesized"
    );

    Some(module)
}
