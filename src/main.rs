//! rolewarden CLI: tier resolution and report-driven demotion.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use rolewarden::config::WardenConfig;
use rolewarden::degrade::plan_demotion;
use rolewarden::ledger::NewReport;
use rolewarden::marker::{MarkerKey, ParticipantId};
use rolewarden::membership::InMemoryMembership;
use rolewarden::notify::TracingNotifier;
use rolewarden::resolve::GrantResolver;
use rolewarden::trials::NewTrial;
use rolewarden::warden::Warden;

#[derive(Parser)]
#[command(name = "rolewarden", version, about = "Tier resolution and demotion engine")]
struct Cli {
    /// Configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for the durable report ledger and trial log.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Role catalog file (TOML). Defaults to the built-in catalog.
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the role catalog.
    Catalog {
        /// Emit TOML instead of JSON.
        #[arg(long)]
        toml: bool,
    },

    /// Plan grants against a marker set.
    Resolve {
        /// Currently held markers (comma-separated).
        #[arg(long, value_delimiter = ',')]
        held: Vec<MarkerKey>,

        /// Markers to grant, resolved in order.
        #[arg(long, required = true)]
        grant: Vec<MarkerKey>,
    },

    /// Plan the one-tier demotion of a reported marker.
    Demote {
        /// Currently held markers (comma-separated).
        #[arg(long, value_delimiter = ',')]
        held: Vec<MarkerKey>,

        /// The reported marker.
        #[arg(long)]
        marker: MarkerKey,
    },

    /// Record an approved report and apply any resulting demotion.
    ApproveReport {
        /// Reported participant (id or mention).
        #[arg(long)]
        subject: ParticipantId,

        /// Reported marker.
        #[arg(long)]
        marker: MarkerKey,

        /// Reporting participant (id or mention).
        #[arg(long)]
        reporter: ParticipantId,

        /// Link to the evidence.
        #[arg(long)]
        evidence: Option<String>,

        /// Markers the subject currently holds (comma-separated).
        #[arg(long, value_delimiter = ',')]
        held: Vec<MarkerKey>,
    },

    /// List the reports on file for a participant.
    Reports {
        /// Participant id or mention.
        #[arg(long)]
        subject: ParticipantId,
    },

    /// Grant a passed trial's tier and record the trial.
    PassTrial {
        /// Trialee (id or mention).
        #[arg(long)]
        trialee: ParticipantId,

        /// Trial host (id or mention).
        #[arg(long)]
        host: ParticipantId,

        /// Tier the trialee passed.
        #[arg(long)]
        marker: MarkerKey,

        /// Link to the trial message.
        #[arg(long)]
        link: Option<String>,

        /// Team member as `<id>:<slot>`, e.g. `1234:Base`. Repeatable.
        #[arg(long = "member")]
        members: Vec<String>,

        /// Markers the trialee currently holds (comma-separated).
        #[arg(long, value_delimiter = ',')]
        held: Vec<MarkerKey>,
    },

    /// Show trial history or the trial team leaderboard.
    Trials {
        /// Show the trials passed by this participant instead of the leaderboard.
        #[arg(long)]
        trialee: Option<ParticipantId>,

        /// Only count trials since this Unix timestamp.
        #[arg(long, default_value = "0")]
        since: u64,
    },

    /// Score a DPM application and plan the tier grant.
    Dpm {
        /// Total damage dealt.
        #[arg(long)]
        damage: String,

        /// Kill time as m:ss or m:ss.t.
        #[arg(long)]
        time: String,

        /// Markers the applicant currently holds (comma-separated).
        #[arg(long, value_delimiter = ',')]
        held: Vec<MarkerKey>,
    },

    /// Show engine configuration.
    Info,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => WardenConfig::from_toml_file(path)?,
        None => WardenConfig::default(),
    };
    if cli.data_dir.is_some() {
        config.data_dir = cli.data_dir.clone();
    }
    if cli.catalog.is_some() {
        config.catalog = cli.catalog.clone();
    }

    // A CLI invocation only sees the markers passed on the command line.
    let members = Arc::new(InMemoryMembership::new());
    let warden = Warden::new(config, members.clone(), Arc::new(TracingNotifier))?;

    match cli.command {
        Commands::Catalog { toml } => {
            let catalog = warden.graph().catalog();
            if toml {
                print!("{}", catalog.to_toml()?);
            } else {
                println!("{}", serde_json::to_string_pretty(catalog).into_diagnostic()?);
            }
        }

        Commands::Resolve { held, grant } => {
            let current: BTreeSet<MarkerKey> = held.into_iter().collect();
            let graph = warden.graph();
            let resolver = GrantResolver::new(graph);

            let (cosmetic, tiers): (Vec<MarkerKey>, Vec<MarkerKey>) =
                grant.into_iter().partition(|m| graph.is_cosmetic(*m));
            let mut plan = resolver.resolve_all(&current, &tiers)?;
            let mut after = plan.apply(&current);
            for marker in cosmetic {
                for step in &resolver.resolve_cosmetic(&after, marker)? {
                    plan.push_add(step.marker);
                }
                after.insert(marker);
            }

            println!("plan:  {plan}");
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "plan": plan,
                    "after": after,
                }))
                .into_diagnostic()?
            );
        }

        Commands::Demote { held, marker } => {
            let current: BTreeSet<MarkerKey> = held.into_iter().collect();
            let planned = plan_demotion(warden.graph(), &current, marker)?;
            let after = planned.plan.apply(&current);
            println!("plan:  {}", planned.plan);
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "verdict": planned.verdict,
                    "targets": planned.targets,
                    "plan": planned.plan,
                    "after": after,
                }))
                .into_diagnostic()?
            );
        }

        Commands::ApproveReport {
            subject,
            marker,
            reporter,
            evidence,
            held,
        } => {
            members.seed(subject, &held);
            warden.check_report(subject, marker, reporter)?;
            let mut report = NewReport::new(subject, marker, reporter);
            if let Some(link) = evidence {
                report = report.with_evidence(link);
            }
            let outcome = warden.approve_report(report)?;
            println!("{}", serde_json::to_string_pretty(&outcome).into_diagnostic()?);
            println!("markers: {:?}", warden.markers(subject)?);
        }

        Commands::Reports { subject } => {
            let records = warden.reports_for(subject)?;
            if records.is_empty() {
                println!("No reports on file for {subject}.");
            } else {
                println!("{}", serde_json::to_string_pretty(&records).into_diagnostic()?);
            }
        }

        Commands::PassTrial {
            trialee,
            host,
            marker,
            link,
            members: team,
            held,
        } => {
            members.seed(trialee, &held);
            let mut trial = NewTrial::new(trialee, host, marker);
            if let Some(link) = link {
                trial = trial.with_link(link);
            }
            for entry in team {
                let (id, slot) = entry
                    .split_once(':')
                    .ok_or_else(|| miette::miette!("team member {entry:?} is not <id>:<slot>"))?;
                let id: ParticipantId = id.parse().into_diagnostic()?;
                trial = trial.with_participant(id, slot);
            }
            let outcome = warden.pass_trial(trial)?;
            println!("plan:  {}", outcome.plan);
            println!("{}", serde_json::to_string_pretty(&outcome).into_diagnostic()?);
        }

        Commands::Trials { trialee, since } => match trialee {
            Some(trialee) => {
                let trials = warden.trials_for(trialee)?;
                if trials.is_empty() {
                    println!("No trials on file for {trialee}.");
                } else {
                    println!("{}", serde_json::to_string_pretty(&trials).into_diagnostic()?);
                }
            }
            None => {
                let board = warden.trial_leaderboard(since)?;
                println!("{}", serde_json::to_string_pretty(&board).into_diagnostic()?);
            }
        },

        Commands::Dpm { damage, time, held } => {
            let applicant = ParticipantId::new(0);
            members.seed(applicant, &held);
            let outcome = warden.approve_dpm(applicant, &damage, &time)?;
            println!(
                "{}k DPM qualifies for {}",
                outcome.assessment.kdpm, outcome.assessment.tier
            );
            println!("{}", serde_json::to_string_pretty(&outcome).into_diagnostic()?);
        }

        Commands::Info => {
            print!("{}", warden.info());
        }
    }

    Ok(())
}
