//! render-eval CLI - render quality evaluation tool

use clap::Parser;

mod commands;

/// Score rendered views against ground truth for one or more scenes.
///
/// Each scene root must contain `<set>/<method>/renders/` and
/// `<set>/<method>/gt/`. Results are written to `<scene>/<set>_results.json`
/// and `<scene>/<set>_per_view.json`.
#[derive(Parser)]
#[command(name = "render-eval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(flatten)]
    evaluate: commands::evaluate::EvaluateArgs,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    commands::evaluate::run(cli.evaluate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_multiple_scenes() {
        let cli = Cli::try_parse_from([
            "render-eval",
            "-m",
            "data/garden",
            "data/bicycle",
            "-s",
            "test",
            "--gaze",
            "0.25,0.5",
        ])
        .unwrap();
        assert_eq!(cli.evaluate.model_paths.len(), 2);
        assert_eq!(cli.evaluate.set, "test");
        assert_eq!(cli.evaluate.gaze.x, 0.25);
        assert!(!cli.evaluate.strict);
    }

    #[test]
    fn test_scene_and_set_are_required() {
        assert!(Cli::try_parse_from(["render-eval", "-s", "test"]).is_err());
        assert!(Cli::try_parse_from(["render-eval", "-m", "scene"]).is_err());
        assert!(Cli::try_parse_from(["render-eval", "--model_paths", "a", "--set", "t"]).is_ok());
    }

    #[test]
    fn test_rejects_bad_viewing_parameters() {
        let base = ["render-eval", "-m", "a", "-s", "t"];
        let with = |extra: &[&'static str]| {
            let mut args = base.to_vec();
            args.extend_from_slice(extra);
            Cli::try_parse_from(args)
        };
        assert!(with(&["--ppd", "0"]).is_err());
        assert!(with(&["--ppd", "60"]).is_ok());
        assert!(with(&["--gaze", "2,0"]).is_err());
        assert!(with(&["--hvs-levels", "0"]).is_err());
    }
}
