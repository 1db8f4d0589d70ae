//! Command-line surface. Mirrors the teacher's `Cli`/`Command` shape,
//! scoped down to what a control plane binary needs: serve, and a couple
//! of catalog-file sanity checks borrowed from `config validate`/`config
//! show`.

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "mcpctl", version, about = "MCP control plane gateway")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Parse the catalog file and report any errors.
    Validate,
    /// Dump the resolved catalog (with defaults applied) as TOML.
    Show,
    /// Print version information.
    Version,
}

/// Path to the catalog file, from `MCPCTL_CATALOG` or `catalog.toml`.
pub fn catalog_path() -> String {
    std::env::var("MCPCTL_CATALOG").unwrap_or_else(|_| "catalog.toml".into())
}

/// Host/port the HTTP surface binds to, from `MCPCTL_HOST`/`MCPCTL_PORT`.
pub fn bind_addr() -> String {
    let host = std::env::var("MCPCTL_HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let port = std::env::var("MCPCTL_PORT").unwrap_or_else(|_| "8900".into());
    format!("{host}:{port}")
}

#[cfg(test)]
mod tests {
    use super::*;

    // Both checks live in one test: these helpers read process-global env
    // vars, so two tests mutating them would race under the default
    // parallel test runner.
    #[test]
    fn env_var_defaulting_and_overrides() {
        std::env::remove_var("MCPCTL_CATALOG");
        std::env::remove_var("MCPCTL_HOST");
        std::env::remove_var("MCPCTL_PORT");
        assert_eq!(catalog_path(), "catalog.toml");
        assert_eq!(bind_addr(), "127.0.0.1:8900");

        std::env::set_var("MCPCTL_CATALOG", "/etc/mcpctl/catalog.toml");
        std::env::set_var("MCPCTL_HOST", "0.0.0.0");
        std::env::set_var("MCPCTL_PORT", "9000");
        assert_eq!(catalog_path(), "/etc/mcpctl/catalog.toml");
        assert_eq!(bind_addr(), "0.0.0.0:9000");

        std::env::remove_var("MCPCTL_CATALOG");
        std::env::remove_var("MCPCTL_HOST");
        std::env::remove_var("MCPCTL_PORT");
    }
}
