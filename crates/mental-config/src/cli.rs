//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::{Config, PipelineVariant};

/// Mental engine command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "mental", about = "Deferred renderer with shadows, SSAO and IBL")]
pub struct CliArgs {
    /// Window width.
    #[arg(long)]
    pub width: Option<u32>,

    /// Window height.
    #[arg(long)]
    pub height: Option<u32>,

    /// Equirectangular HDR environment to bake.
    #[arg(long)]
    pub hdr: Option<PathBuf>,

    /// Use the Blinn-Phong lighting variant instead of PBR.
    #[arg(long)]
    pub blinn_phong: bool,

    /// Disable screen-space ambient occlusion.
    #[arg(long)]
    pub no_ssao: bool,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(w) = args.width {
            self.window.width = w;
        }
        if let Some(h) = args.height {
            self.window.height = h;
        }
        if let Some(ref hdr) = args.hdr {
            self.render.hdr_environment = hdr.clone();
        }
        if args.blinn_phong {
            self.render.variant = PipelineVariant::BlinnPhong;
        }
        if args.no_ssao {
            self.render.ssao.enabled = false;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
