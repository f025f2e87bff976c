//! `dsrs-tickets`: classify French IT support tickets with a local model and
//! measure, optimize and compare the classifiers.
//!
//! ## Commands
//!
//! - `check`: liveness check against the model server
//! - `run <1..5|all>`: walkthrough scenarios
//! - `evaluate`: score the baseline on the validation split
//! - `benchmark`: time the baseline on several models
//! - `optimize`: few-shot bootstrapping, before/after
//! - `classify`: classify one ticket, optionally by majority vote across models
//! - `stats`: bundled dataset summary

mod backend;
mod data;
mod modules;
mod scenarios;
mod signatures;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dsrs_eval::{
    Dataset, Effort, Evaluator, ExactMatch, FailurePolicy, LMConfig, LanguageModel, Metric, Module,
    PartialMatch, WeightedMatch, example, init_tracing,
};
use tracing::info;

use crate::backend::Backend;
use crate::scenarios::{Selection, Workbench};

#[derive(Parser, Debug)]
#[command(name = "dsrs-tickets")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "IT ticket classification with DSRs: evaluate, benchmark, optimize", long_about = None)]
struct Cli {
    /// Model to classify with (`provider/model`; bare names go through Ollama)
    #[arg(long, global = true, env = "DSRS_MODEL", default_value = "ollama_chat/llama3.1:8b")]
    model: String,

    /// Model server base URL
    #[arg(long, global = true, env = "OLLAMA_HOST")]
    base_url: Option<String>,

    /// Sampling temperature
    #[arg(long, global = true, default_value_t = 0.3)]
    temperature: f32,

    /// Maximum tokens per completion
    #[arg(long, global = true, default_value_t = 1024)]
    max_tokens: u32,

    /// Per-request timeout in seconds
    #[arg(long, global = true, default_value_t = 120)]
    timeout: u64,

    /// What to do when a prediction fails during evaluation (`zero` or `abort`)
    #[arg(long, global = true, default_value = "zero")]
    policy: FailurePolicy,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the model server is reachable and the model is available
    Check,

    /// Run walkthrough scenarios
    Run {
        /// Scenario number (1-5) or `all`
        #[arg(default_value = "all")]
        scenario: Selection,

        /// Models for the benchmark and hybrid scenarios
        #[arg(long, value_delimiter = ',', default_values_t = default_models())]
        models: Vec<String>,

        /// Optimization budget for scenario 3
        #[arg(long, default_value = "light")]
        effort: Effort,
    },

    /// Score the baseline classifier on the validation split
    Evaluate {
        #[arg(long, value_enum, default_value_t = MetricChoice::Exact)]
        metric: MetricChoice,

        /// Only evaluate the first N validation tickets
        #[arg(long)]
        limit: Option<usize>,

        /// Log expected and predicted labels for every ticket
        #[arg(short, long)]
        verbose: bool,
    },

    /// Benchmark the baseline classifier across models
    Benchmark {
        #[arg(long, value_delimiter = ',', default_values_t = default_models())]
        models: Vec<String>,

        /// Only use the first N validation tickets
        #[arg(long)]
        limit: Option<usize>,

        /// Print the report as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Bootstrap few-shot demos on the training split and compare scores
    Optimize {
        #[arg(long, default_value = "light")]
        effort: Effort,
    },

    /// Classify a single ticket
    Classify {
        /// Ticket text (defaults to a sample ticket)
        ticket: Option<String>,

        /// Majority vote of one classifier per model in `--models`
        #[arg(long)]
        ensemble: bool,

        /// Ensemble members
        #[arg(long, value_delimiter = ',', default_values_t = default_models(), requires = "ensemble")]
        models: Vec<String>,
    },

    /// Show dataset statistics
    Stats,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum MetricChoice {
    Exact,
    Partial,
    Category,
    Priority,
    Weighted,
}

impl MetricChoice {
    fn build(self) -> Box<dyn Metric> {
        match self {
            MetricChoice::Exact => Box::new(ExactMatch::new(["category", "priority"])),
            MetricChoice::Partial => Box::new(PartialMatch::new(["category", "priority"])),
            MetricChoice::Category => {
                Box::new(ExactMatch::new(["category"]).named("category_only"))
            }
            MetricChoice::Priority => {
                Box::new(ExactMatch::new(["priority"]).named("priority_only"))
            }
            MetricChoice::Weighted => {
                Box::new(WeightedMatch::new([("category", 0.7), ("priority", 0.5)]))
            }
        }
    }
}

fn default_models() -> Vec<String> {
    ["llama3.1:8b", "mistral:7b", "qwen2.5:7b"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Cli {
    fn backend(&self) -> Backend {
        Backend {
            config: LMConfig::builder()
                .model(self.model.clone())
                .temperature(self.temperature)
                .max_tokens(self.max_tokens)
                .timeout(Duration::from_secs(self.timeout))
                .build(),
            base_url: self.base_url.clone(),
        }
    }

    fn evaluator(&self, verbose: bool) -> Evaluator {
        Evaluator::builder()
            .failure_policy(self.policy)
            .verbose(verbose)
            .build()
    }
}

async fn workbench(
    cli: &Cli,
    models: &[String],
    effort: Effort,
    verbose: bool,
) -> Result<Workbench> {
    let backend = cli.backend();
    let lm: Arc<dyn LanguageModel> = backend.connect_checked(&cli.model).await?;
    Ok(Workbench {
        lm,
        models: backend.connect_all(models)?,
        dataset: data::dataset().context("bundled dataset is inconsistent")?,
        evaluator: cli.evaluator(verbose),
        effort,
    })
}

fn limited(bench: &mut Workbench, limit: Option<usize>) -> Result<()> {
    if let Some(limit) = limit {
        let mut validation = bench.dataset.validation().to_vec();
        validation.truncate(limit);
        bench.dataset = Dataset::new(bench.dataset.train().to_vec(), validation)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();
    info!(model = %cli.model, command = ?cli.command, "starting");

    match &cli.command {
        Command::Stats => {
            print!("{}", data::render_stats(&data::dataset()?));
        }
        Command::Check => {
            let lm = cli.backend().connect_checked(&cli.model).await?;
            println!("{} is reachable at {}", lm.model_id(), lm.endpoint());
        }
        Command::Classify {
            ticket,
            ensemble,
            models,
        } => {
            let members: &[String] = if *ensemble { models } else { &[] };
            let bench = workbench(&cli, members, Effort::default(), false).await?;
            let text = ticket.as_deref().unwrap_or(data::SAMPLE_TICKET);
            let classifier: Box<dyn Module> = if *ensemble {
                Box::new(modules::ensemble_classifier(&bench.models))
            } else {
                Box::new(modules::validated_classifier(bench.lm.clone()))
            };
            let prediction = classifier
                .forward(&example! { "ticket": "input" => text })
                .await?;
            println!("{}", serde_json::to_string_pretty(&prediction.data)?);
        }
        Command::Run {
            scenario,
            models,
            effort,
        } => {
            let bench = workbench(&cli, models, *effort, false).await?;
            bench.run_all(scenario).await?;
        }
        Command::Evaluate {
            metric,
            limit,
            verbose,
        } => {
            let mut bench = workbench(&cli, &[], Effort::default(), *verbose).await?;
            limited(&mut bench, *limit)?;
            let metric = metric.build();
            let classifier = modules::SimpleTicketClassifier::new(bench.lm.clone());
            let report = bench
                .evaluator
                .run(&classifier, bench.dataset.validation(), metric.as_ref())
                .await?;
            println!(
                "{}: {:.1}% over {} ticket(s), {} failed",
                report.metric,
                report.mean() * 100.0,
                report.len(),
                report.failures()
            );
        }
        Command::Benchmark {
            models,
            limit,
            json,
        } => {
            let mut bench = workbench(&cli, models, Effort::default(), false).await?;
            limited(&mut bench, *limit)?;
            let report = bench.benchmark().await?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.render_table());
            }
        }
        Command::Optimize { effort } => {
            let bench = workbench(&cli, &[], *effort, false).await?;
            bench.optimization().await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_local_setup() {
        let cli = Cli::try_parse_from(["dsrs-tickets", "run"]).expect("parses");
        assert_eq!(cli.model, "ollama_chat/llama3.1:8b");
        assert_eq!(cli.policy, FailurePolicy::ScoreZero);
        match cli.command {
            Command::Run {
                scenario, models, ..
            } => {
                assert_eq!(scenario.0.len(), 5);
                assert_eq!(models, default_models());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn benchmark_takes_a_comma_separated_model_list() {
        let cli = Cli::try_parse_from([
            "dsrs-tickets",
            "benchmark",
            "--models",
            "llama3.1:8b,openai/gpt-4o-mini",
            "--limit",
            "3",
            "--json",
            "--policy",
            "abort",
        ])
        .expect("parses");
        assert_eq!(cli.policy, FailurePolicy::Abort);
        match cli.command {
            Command::Benchmark {
                models,
                limit,
                json,
            } => {
                assert_eq!(models, vec!["llama3.1:8b", "openai/gpt-4o-mini"]);
                assert_eq!(limit, Some(3));
                assert!(json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn classify_ensemble_takes_its_members() {
        let cli = Cli::try_parse_from([
            "dsrs-tickets",
            "classify",
            "Le VPN coupe",
            "--ensemble",
            "--models",
            "llama3.1:8b,mistral:7b",
        ])
        .expect("parses");
        match cli.command {
            Command::Classify {
                ticket,
                ensemble,
                models,
            } => {
                assert_eq!(ticket.as_deref(), Some("Le VPN coupe"));
                assert!(ensemble);
                assert_eq!(models, vec!["llama3.1:8b", "mistral:7b"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        assert!(
            Cli::try_parse_from(["dsrs-tickets", "classify", "--models", "mistral:7b"]).is_err()
        );
    }

    #[test]
    fn bad_scenario_and_effort_are_rejected() {
        assert!(Cli::try_parse_from(["dsrs-tickets", "run", "9"]).is_err());
        assert!(Cli::try_parse_from(["dsrs-tickets", "optimize", "--effort", "max"]).is_err());
    }

    #[test]
    fn every_metric_choice_builds() {
        for choice in MetricChoice::value_variants() {
            assert!(!choice.build().name().is_empty());
        }
    }
}
