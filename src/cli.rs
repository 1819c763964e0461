//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Resolve media through third-party provider APIs.
///
/// Prints the resolved media (a single item or a playlist) as JSON on stdout.
/// Logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "third-api")]
#[command(author, version, about)]
pub struct Args {
    /// Page URLs or provider ids to resolve; several inputs form one playlist
    #[arg(required = true)]
    pub inputs: Vec<String>,

    /// Provider to use: a provider name, `auto`, or `mutil_api`
    #[arg(short, long)]
    pub api: Option<String>,

    /// Fail instead of trying every provider when none matches the input
    #[arg(long)]
    pub strict: bool,

    /// RapidAPI key; repeat to list fallbacks (first non-empty wins)
    #[arg(long = "rapidapi-key", value_name = "KEY")]
    pub rapidapi_keys: Vec<String>,

    /// HikerAPI key for the Instagram provider
    #[arg(long = "hikerapi-key", value_name = "KEY")]
    pub hikerapi_keys: Vec<String>,

    /// External resolver address (`host:port` URL or bare port)
    #[arg(long, value_name = "ADDR")]
    pub external_ie: Option<String>,

    /// Media kinds to keep in playlists (video, audio, photo, mixed)
    #[arg(long = "media-filter", value_name = "KIND")]
    pub media_filter: Vec<String>,

    /// Try RapidAPI providers first
    #[arg(long)]
    pub prefer_rapidapi: bool,

    /// Use RapidAPI providers only
    #[arg(long, conflicts_with = "prefer_rapidapi")]
    pub only_rapidapi: bool,

    /// Refuse all third-party API calls
    #[arg(long)]
    pub disable_third_api: bool,

    /// Frequency guard state file (default: system temp directory)
    #[arg(long, value_name = "PATH")]
    pub guard_file: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_single_input_parses() {
        let args = Args::try_parse_from(["third-api", "https://vimeo.com/1"]).unwrap();
        assert_eq!(args.inputs, vec!["https://vimeo.com/1"]);
        assert!(args.api.is_none());
        assert!(!args.strict);
        assert_eq!(args.verbose, 0);
    }

    #[test]
    fn test_cli_requires_input() {
        let err = Args::try_parse_from(["third-api"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_cli_repeated_keys_keep_order() {
        let args = Args::try_parse_from([
            "third-api",
            "--rapidapi-key",
            "",
            "--rapidapi-key",
            "second",
            "u",
        ])
        .unwrap();
        assert_eq!(args.rapidapi_keys, vec!["", "second"]);
    }

    #[test]
    fn test_cli_prefer_and_only_conflict() {
        let result =
            Args::try_parse_from(["third-api", "--prefer-rapidapi", "--only-rapidapi", "u"]);
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::ArgumentConflict
        );
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["third-api", "-vv", "u"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["third-api", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
