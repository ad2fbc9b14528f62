//! Route/Function Registry (spec §4.3)
//!
//! Two declarative YAML files loaded at startup and cached in memory; no
//! runtime re-read (process restart on config change, per spec).

mod functions;
mod routes;

pub use functions::{FunctionDescriptor, FunctionsFile};
pub use routes::{Route, RouteMatch, RouteTable};

use std::path::Path;

use anyhow::Result;

pub struct Registry {
    routes: RouteTable,
    functions: FunctionsFile,
}

impl Registry {
    pub fn load(routes_file: &Path, functions_file: &Path) -> Result<Self> {
        Ok(Self {
            routes: RouteTable::load(routes_file)?,
            functions: FunctionsFile::load(functions_file)?,
        })
    }

    pub fn matches(&self, method: &str, path: &str) -> Option<RouteMatch<'_>> {
        self.routes.matches(method, path)
    }

    pub fn get_function(&self, name: &str) -> Option<&FunctionDescriptor> {
        self.functions.get(name)
    }
}
