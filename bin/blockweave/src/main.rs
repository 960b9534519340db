//! Blockweave CLI
//!
//! Generates multi-page websites from reusable content blocks.
//!
//! This is the binary entry point. The library functionality is in `lib.rs`.

use blockweave::cmd::OutputOptions;
use blockweave_generator::{GenerateRequest, RegenerateBlockRequest};
use clap::Parser;
use color_eyre::eyre::Result;

/// Command-line interface for blockweave.
#[derive(Parser)]
#[command(
    name = "blockweave",
    version,
    about = "Generate multi-page websites from reusable content blocks"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "blockweave.toml")]
    config: std::path::PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Output flags shared by the generating commands.
#[derive(clap::Args)]
struct OutputArgs {
    /// Unpack the site archive into this directory
    #[arg(short, long)]
    export: Option<std::path::PathBuf>,
    /// Print the full response as JSON
    #[arg(long)]
    json: bool,
}

impl OutputArgs {
    fn options(&self) -> OutputOptions<'_> {
        OutputOptions {
            export: self.export.as_deref(),
            json: self.json,
        }
    }
}

/// Available CLI commands.
#[derive(clap::Subcommand)]
enum Commands {
    /// Generate a new site from a template
    Generate {
        /// Template id
        #[arg(short, long)]
        template: String,
        /// Description of the business or site
        prompt: String,
        /// Site name (defaults to the template id)
        #[arg(long)]
        name: Option<String>,
        /// Target country
        #[arg(long, default_value = "US")]
        country: String,
        /// Content language
        #[arg(short, long, default_value = "en")]
        language: String,
        /// Override the configured domain
        #[arg(long)]
        domain: Option<String>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Regenerate every page of an existing site
    Regenerate {
        /// Site id
        site_id: String,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Regenerate a single block instance of an existing site
    RegenerateBlock {
        /// Site id
        site_id: String,
        /// Page filename (e.g., index.html)
        #[arg(short, long)]
        page: String,
        /// Generation id of the block (e.g., hero-1)
        #[arg(short, long)]
        block: String,
        /// The block is global
        #[arg(long)]
        global: bool,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Validate configuration and block catalog
    Check {
        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    blockweave::init_tracing(cli.verbose);

    match cli.command {
        Commands::Generate {
            template,
            prompt,
            name,
            country,
            language,
            domain,
            output,
        } => {
            let request = GenerateRequest {
                name: name.unwrap_or_else(|| template.clone()),
                prompt,
                country,
                language,
                template_id: template,
                site_id: None,
                domain,
            };
            blockweave::cmd::generate::run(&cli.config, &request, output.options()).await?;
        }
        Commands::Regenerate { site_id, output } => {
            blockweave::cmd::regenerate::run(&cli.config, &site_id, output.options()).await?;
        }
        Commands::RegenerateBlock {
            site_id,
            page,
            block,
            global,
            output,
        } => {
            let request = RegenerateBlockRequest {
                site_id,
                page_filename: page,
                generation_id: block,
                is_global: global,
            };
            blockweave::cmd::regenerate_block::run(&cli.config, &request, output.options())
                .await?;
        }
        Commands::Check { strict } => {
            blockweave::cmd::check::run(&cli.config, strict)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_cli_generate_command_parsing() {
        let args = [
            "blockweave",
            "generate",
            "--template",
            "bakery",
            "A family bakery in Lyon",
        ];
        let cli = Cli::parse_from(args);

        assert_eq!(cli.config, std::path::PathBuf::from("blockweave.toml"));
        assert_eq!(cli.verbose, 0);

        match cli.command {
            Commands::Generate {
                template,
                prompt,
                name,
                country,
                language,
                domain,
                output,
            } => {
                assert_eq!(template, "bakery");
                assert_eq!(prompt, "A family bakery in Lyon");
                assert!(name.is_none());
                assert_eq!(country, "US");
                assert_eq!(language, "en");
                assert!(domain.is_none());
                assert!(output.export.is_none());
                assert!(!output.json);
            }
            _ => panic!("Expected Generate command"),
        }
    }

    #[test]
    fn test_cli_generate_with_locale_and_export() {
        let args = [
            "blockweave",
            "generate",
            "-t",
            "bakery",
            "Boulangerie",
            "--country",
            "FR",
            "--language",
            "fr",
            "--domain",
            "boulangerie.example",
            "--export",
            "public",
            "--json",
        ];
        let cli = Cli::parse_from(args);

        match cli.command {
            Commands::Generate {
                country,
                language,
                domain,
                output,
                ..
            } => {
                assert_eq!(country, "FR");
                assert_eq!(language, "fr");
                assert_eq!(domain.as_deref(), Some("boulangerie.example"));
                assert_eq!(output.export, Some(std::path::PathBuf::from("public")));
                assert!(output.json);
            }
            _ => panic!("Expected Generate command"),
        }
    }

    #[test]
    fn test_cli_regenerate_command_parsing() {
        let args = ["blockweave", "regenerate", "site-123"];
        let cli = Cli::parse_from(args);

        match cli.command {
            Commands::Regenerate { site_id, .. } => {
                assert_eq!(site_id, "site-123");
            }
            _ => panic!("Expected Regenerate command"),
        }
    }

    #[test]
    fn test_cli_regenerate_block_command_parsing() {
        let args = [
            "blockweave",
            "regenerate-block",
            "site-123",
            "--page",
            "services.html",
            "--block",
            "header-0",
            "--global",
        ];
        let cli = Cli::parse_from(args);

        match cli.command {
            Commands::RegenerateBlock {
                site_id,
                page,
                block,
                global,
                ..
            } => {
                assert_eq!(site_id, "site-123");
                assert_eq!(page, "services.html");
                assert_eq!(block, "header-0");
                assert!(global);
            }
            _ => panic!("Expected RegenerateBlock command"),
        }
    }

    #[test]
    fn test_cli_check_command_parsing() {
        let args = ["blockweave", "check", "--strict"];
        let cli = Cli::parse_from(args);

        match cli.command {
            Commands::Check { strict } => {
                assert!(strict);
            }
            _ => panic!("Expected Check command"),
        }
    }

    #[test]
    fn test_cli_verbosity_flags() {
        let args = ["blockweave", "-vvv", "check"];
        let cli = Cli::parse_from(args);
        assert_eq!(cli.verbose, 3);
    }

    #[test]
    fn test_cli_custom_config_path() {
        let args = ["blockweave", "--config", "site.toml", "check"];
        let cli = Cli::parse_from(args);
        assert_eq!(cli.config, std::path::PathBuf::from("site.toml"));
    }
}
