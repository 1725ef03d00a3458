use clap::{Parser, Subcommand};

/// revgate — CI review aggregation and autofix pipeline
#[derive(Parser, Debug, Clone)]
#[command(name = "revgate", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,

    /// Path to the policy file
    #[arg(long, global = true, default_value = "config/policy.toml")]
    pub policy: String,

    /// Path to the agent specs file
    #[arg(long, global = true, default_value = "config/agents.toml")]
    pub agents: String,

    /// Path the JSON report is written to
    #[arg(long, global = true)]
    pub output: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CliCommand {
    /// Collect findings from the configured review agents and decide pass/fail
    Review {
        /// Base commit of the change under review
        #[arg(long)]
        base_sha: Option<String>,

        /// Head commit of the change under review
        #[arg(long)]
        head_sha: Option<String>,
    },

    /// Generate and apply a corrective patch, falling back to marker rewrite
    Autofix {
        /// PR number used in the generated branch name
        #[arg(long)]
        pr_number: Option<String>,

        /// CI run id used in the generated branch name
        #[arg(long)]
        run_id: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_review_defaults() {
        let cli = Cli::parse_from(["revgate", "review"]);
        assert_eq!(cli.policy, "config/policy.toml");
        assert_eq!(cli.agents, "config/agents.toml");
        assert!(cli.output.is_none());
        match cli.command {
            CliCommand::Review { base_sha, head_sha } => {
                assert!(base_sha.is_none());
                assert!(head_sha.is_none());
            }
            _ => panic!("expected review subcommand"),
        }
    }

    #[test]
    fn test_parse_review_with_shas() {
        let cli = Cli::parse_from([
            "revgate",
            "review",
            "--base-sha",
            "abc123",
            "--head-sha",
            "def456",
        ]);
        match cli.command {
            CliCommand::Review { base_sha, head_sha } => {
                assert_eq!(base_sha.as_deref(), Some("abc123"));
                assert_eq!(head_sha.as_deref(), Some("def456"));
            }
            _ => panic!("expected review subcommand"),
        }
    }

    #[test]
    fn test_parse_autofix() {
        let cli = Cli::parse_from(["revgate", "autofix", "--pr-number", "12", "--run-id", "99"]);
        match cli.command {
            CliCommand::Autofix { pr_number, run_id } => {
                assert_eq!(pr_number.as_deref(), Some("12"));
                assert_eq!(run_id.as_deref(), Some("99"));
            }
            _ => panic!("expected autofix subcommand"),
        }
    }

    #[test]
    fn test_global_args_after_subcommand() {
        let cli = Cli::parse_from([
            "revgate",
            "review",
            "--policy",
            "/tmp/p.toml",
            "--agents",
            "/tmp/a.toml",
            "--output",
            "/tmp/out.json",
        ]);
        assert_eq!(cli.policy, "/tmp/p.toml");
        assert_eq!(cli.agents, "/tmp/a.toml");
        assert_eq!(cli.output.as_deref(), Some("/tmp/out.json"));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["revgate"]).is_err());
    }
}
