//! =============================================================================
//! color-loupe - Application principale
//! color-loupe - Main application
//! =============================================================================
//!
//! Ouvre une loupe circulaire qui suit le curseur et affiche la couleur
//! choisie sur la sortie standard.
//!
//! Opens a circular loupe following the cursor and prints the picked color
//! to standard output.
//!
//! # Contrôles / Controls
//! - Souris / Mouse: Déplacer pour choisir / Move to pick color
//! - Clic / Click: Choisir la couleur / Pick the color
//! - Entrée / Return: Choisir la couleur / Pick the color
//! - ESC: Annuler / Cancel
//! - Flèches / Arrow keys: Déplacement fin (1 pixel) / Fine movement (1 pixel)
//! - Shift + Flèches / Shift + Arrows: Déplacement rapide / Fast movement
//! - Molette / Scroll wheel: Zoom avant/arrière / Zoom in/out
//!
//! # Codes de sortie / Exit codes
//! - 0: couleur choisie / color picked
//! - 1: annulé / cancelled
//! - 2: erreur / error

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use color_loupe::{Color, LoupeConfig, LoupeStyle};

const USAGE: &str =
    "usage: color-loupe [--style loupe|sampler] [--config <file.json>] [--json] [-v|--verbose]";

// =============================================================================
// ARGUMENTS
// =============================================================================

#[derive(Debug, Default, PartialEq)]
struct Args {
    style: Option<LoupeStyle>,
    config: Option<PathBuf>,
    json: bool,
    verbose: bool,
    help: bool,
}

/// Parse les arguments de ligne de commande
/// Parses command line arguments
fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Args> {
    let mut parsed = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--style" => {
                let value = args.next().context("--style needs a value")?;
                parsed.style = Some(value.parse()?);
            }
            "--config" => {
                let value = args.next().context("--config needs a path")?;
                parsed.config = Some(PathBuf::from(value));
            }
            "--json" => parsed.json = true,
            "-v" | "--verbose" => parsed.verbose = true,
            "-h" | "--help" => parsed.help = true,
            other => bail!("unknown argument '{}'\n{}", other, USAGE),
        }
    }
    Ok(parsed)
}

/// Configuration: fichier, puis --style par-dessus
/// Configuration: file first, then --style on top
fn load_config(args: &Args) -> anyhow::Result<LoupeConfig> {
    let mut config = match &args.config {
        Some(path) => LoupeConfig::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => LoupeConfig::for_style(args.style.unwrap_or_default()),
    };
    if let Some(style) = args.style {
        if style != config.style {
            // Le style change la formule et les bornes du zoom
            // The style changes the zoom formula and bounds
            config = LoupeConfig::for_style(style);
        }
    }
    config.validate()?;
    Ok(config)
}

fn format_output(color: &Color, json: bool) -> anyhow::Result<String> {
    if json {
        Ok(serde_json::to_string(color)?)
    } else {
        Ok(color.to_string())
    }
}

// =============================================================================
// POINT D'ENTRÉE
// ENTRY POINT
// =============================================================================

fn main() -> ExitCode {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{:#}", err);
            return ExitCode::from(2);
        }
    };
    if args.help {
        println!("{}", USAGE);
        return ExitCode::SUCCESS;
    }

    let mut logger = env_logger::Builder::from_default_env();
    if args.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    match pick(&args) {
        Ok(Some(output)) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        // ESC, perte de focus / ESC, focus loss
        Ok(None) => ExitCode::from(1),
        Err(err) => {
            log::error!("{:#}", err);
            eprintln!("color-loupe: {:#}", err);
            ExitCode::from(2)
        }
    }
}

fn pick(args: &Args) -> anyhow::Result<Option<String>> {
    let config = load_config(args)?;
    log::debug!("starting loupe with {:?}", config);
    match color_loupe::run(config).context("color picking failed")? {
        Some(color) => Ok(Some(format_output(&color, args.json)?)),
        None => Ok(None),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use color_loupe::ColorSpace;

    fn args(list: &[&str]) -> anyhow::Result<Args> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_defaults() {
        assert_eq!(args(&[]).unwrap(), Args::default());
    }

    #[test]
    fn test_parse_all_flags() {
        let parsed = args(&["--style", "sampler", "--config", "a.json", "--json", "-v"]).unwrap();
        assert_eq!(parsed.style, Some(LoupeStyle::Sampler));
        assert_eq!(parsed.config, Some(PathBuf::from("a.json")));
        assert!(parsed.json && parsed.verbose);
    }

    #[test]
    fn test_parse_errors() {
        assert!(args(&["--style"]).is_err());
        assert!(args(&["--style", "zoom"]).is_err());
        assert!(args(&["--frobnicate"]).is_err());
    }

    #[test]
    fn test_style_selects_preset() {
        let config = load_config(&args(&["--style", "sampler"]).unwrap()).unwrap();
        assert_eq!(config, LoupeConfig::sampler());
        let config = load_config(&args(&[]).unwrap()).unwrap();
        assert_eq!(config, LoupeConfig::loupe());
    }

    #[test]
    fn test_missing_config_file_has_context() {
        let err = load_config(&args(&["--config", "/no/such/loupe.json"]).unwrap()).unwrap_err();
        assert!(format!("{:#}", err).contains("failed to load configuration"));
    }

    #[test]
    fn test_output_formats() {
        let color = Color::new(18, 52, 86, ColorSpace::Srgb);
        assert_eq!(
            format_output(&color, false).unwrap(),
            "RGB(18, 52, 86) | HEX: #123456"
        );
        let json: serde_json::Value =
            serde_json::from_str(&format_output(&color, true).unwrap()).unwrap();
        assert_eq!(json["red"], 18);
        assert_eq!(json["color_space"], "srgb");
    }
}
