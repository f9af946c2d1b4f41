//! bridge-post - Publish to LinkedIn from the command line
//!
//! Thin front end over the libpostbridge LinkedIn adapter: publish a post
//! (with media, a link card or as a comment), delete a post, or show the
//! connected account.

use std::io::{IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use libpostbridge::config::{resolve_config_path, Config};
use libpostbridge::context;
use libpostbridge::http::{HttpTransport, ReqwestTransport};
use libpostbridge::link_card::HttpLinkCardFetcher;
use libpostbridge::logging::LoggingConfig;
use libpostbridge::media::LocalMediaStore;
use libpostbridge::providers::linkedin::LinkedinProvider;
use libpostbridge::providers::ProviderDeps;
use libpostbridge::token::FileTokenStore;
use libpostbridge::video_thumbs::VideoThumb;
use libpostbridge::{PostbridgeError, PublishParams, Result, SocialProvider, SocialProviderResponse};
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(name = "bridge-post")]
#[command(version)]
#[command(about = "Publish posts to LinkedIn profiles and pages")]
#[command(long_about = "\
bridge-post - Publish posts to LinkedIn profiles and pages

USAGE:
    # Text post (content from the argument or stdin)
    bridge-post publish \"Hello LinkedIn\"
    echo \"Hello\" | bridge-post publish

    # Images or a video, with alt text in the same order
    bridge-post publish \"Trip\" --media a.jpg --alt \"Harbour\" --media b.jpg

    # Share a link as an article card
    bridge-post publish \"Worth a read\" --url https://example.com/post

    # Comment on an existing post
    bridge-post publish \"Follow-up\" --comment-on urn:li:share:123

    bridge-post delete urn:li:share:123
    bridge-post account

CONFIGURATION:
    Configuration file: ~/.config/postbridge/config.toml
    (override with --config or POSTBRIDGE_CONFIG)

    [linkedin]
    provider = \"linkedin\"       # or \"linkedin_page\"
    provider_id = \"abc123\"
    client_id = \"...\"

    [token]
    path = \"~/.config/postbridge/linkedin.token.json\"

EXIT CODES:
    0 - Success
    1 - LinkedIn rejected the request or it could not be sent
    2 - Authentication error (expired or revoked token)
    3 - Invalid input
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ~/.config/postbridge/config.toml)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Publish a post
    Publish {
        /// Content to post (reads from stdin if not provided)
        content: Option<String>,

        /// Attach a media file (repeatable, in display order)
        #[arg(short, long, value_name = "FILE")]
        media: Vec<PathBuf>,

        /// Alt text for the media file at the same position (repeatable)
        #[arg(long, value_name = "TEXT")]
        alt: Vec<String>,

        /// Thumbnail image for an attached video
        #[arg(long, value_name = "FILE")]
        thumbnail: Option<PathBuf>,

        /// Link to share as an article card
        #[arg(short, long)]
        url: Option<String>,

        /// Post visibility (PUBLIC, CONNECTIONS, ...)
        #[arg(long)]
        visibility: Option<String>,

        /// Post as a comment on this post id
        #[arg(long, value_name = "POST_ID")]
        comment_on: Option<String>,
    },

    /// Delete a post by id
    Delete {
        /// Post id as printed by `publish`
        id: String,
    },

    /// Show the connected account
    Account,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.verbose).init();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => resolve_config_path()?,
    };
    let config = Config::load_from_path(&config_path)?;
    tracing::debug!(config = %config_path.display(), "Loaded configuration");

    let token_store = Arc::new(FileTokenStore::new(config.token_path()));
    let token = token_store.load().map_err(|e| {
        PostbridgeError::InvalidInput(format!(
            "Cannot read access token from {}: {}",
            token_store.path().display(),
            e
        ))
    })?;

    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(&config.http)?);
    let media_store = Arc::new(LocalMediaStore::new(config.media_root()));

    let deps = ProviderDeps {
        transport: transport.clone(),
        media: media_store.clone(),
        link_cards: Arc::new(HttpLinkCardFetcher::new(transport)),
        token_store,
    };
    let mut provider = LinkedinProvider::new(&config, token, deps);

    let response = match cli.command {
        Commands::Publish {
            content,
            media,
            alt,
            thumbnail,
            url,
            visibility,
            comment_on,
        } => {
            let text = match content {
                Some(text) => text,
                None => read_stdin()?,
            };

            let mut attachments = Vec::with_capacity(media.len());
            for (index, path) in media.iter().enumerate() {
                let alt_text = alt.get(index).cloned();
                attachments.push(media_store.register_file(&std::fs::canonicalize(path)?, alt_text)?);
            }

            let mut video_thumbs = Vec::new();
            if let Some(path) = thumbnail {
                let video = attachments.iter().find(|m| m.is_video()).ok_or_else(|| {
                    PostbridgeError::InvalidInput("--thumbnail needs a video in --media".to_string())
                })?;
                let thumb = media_store.register_file(&std::fs::canonicalize(path)?, None)?;
                video_thumbs.push(VideoThumb::new(video.id, thumb.id));
            }

            let params = PublishParams {
                visibility,
                url,
                video_thumbs,
                previous_post_response: comment_on.map(|id| {
                    SocialProviderResponse::success(Value::Null, context! { "id" => id })
                }),
            };

            provider.publish_post(&text, &attachments, &params).await?
        }
        Commands::Delete { id } => provider.delete_post(&id).await?,
        Commands::Account => provider.get_account().await?,
    };

    print_response(&response, cli.format)?;

    Ok(response_exit_code(&response))
}

fn read_stdin() -> Result<String> {
    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Err(PostbridgeError::InvalidInput(
            "No content provided. Pass it as an argument or pipe it on stdin".to_string(),
        ));
    }

    let mut text = String::new();
    stdin.read_to_string(&mut text)?;
    let text = text.trim_end_matches(['\n', '\r']).to_string();

    if text.trim().is_empty() {
        return Err(PostbridgeError::InvalidInput("Content cannot be empty".to_string()));
    }
    Ok(text)
}

fn print_response(response: &SocialProviderResponse, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(response).map_err(|e| {
                PostbridgeError::InvalidInput(format!("Cannot encode response: {}", e))
            })?;
            println!("{}", json);
        }
        OutputFormat::Text if response.has_error() => {
            let kind = response
                .error_kind()
                .map(|k| k.to_string())
                .unwrap_or_else(|| "error".to_string());
            eprintln!("Error ({}): {}", kind, response.value());
            if let Some(seconds) = response.retry_after() {
                eprintln!("Rate limited, retry after {}s", seconds);
            }
        }
        OutputFormat::Text => {
            for (key, value) in response.context() {
                match value {
                    Value::String(s) => println!("{}: {}", key, s),
                    other => println!("{}: {}", key, other),
                }
            }
        }
    }
    Ok(())
}

fn response_exit_code(response: &SocialProviderResponse) -> i32 {
    if !response.has_error() {
        0
    } else if response.is_unauthorized() {
        2
    } else {
        1
    }
}
