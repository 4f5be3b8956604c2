use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use clap::Parser;
use dialoguer::Confirm;
use log::{error, warn};

use photo_dedupe_remover::classifier::{Classifier, ConsoleReporter, DeletionPlan, DiskStore};
use photo_dedupe_remover::image_error::DedupeError;
use photo_dedupe_remover::run::{DedupeRun, RunOutcome};


#[derive(Parser, Debug)]
#[command(name = "dupremove", version, about = "Finds photos that look the same and deletes all but the first copy")]
struct Cli {
	/// Directory to search recursively for photos
	root: PathBuf,

	/// Number of CPU threads used to decode and hash images
	#[arg(short = 't', long = "threads", default_value_t = ConfigOptions::DEFAULT_NUM_THREADS)]
	num_threads: u32,

	/// List the duplicates that would be deleted without deleting anything
	#[arg(short = 'n', long = "dry-run")]
	dry_run: bool,

	/// Delete without asking for confirmation
	#[arg(short = 'y', long = "yes", conflicts_with = "dry_run")]
	assume_yes: bool,
}

pub struct ConfigOptions {
	pub root: PathBuf,
	pub num_threads: u32,
	pub dry_run: bool,
	pub assume_yes: bool,
}

impl ConfigOptions {
	pub const DEFAULT_NUM_THREADS: u32 = 4;
}

fn set_config_options( cli: Cli ) -> Result<ConfigOptions, DedupeError> {
	if cli.num_threads < 1 {
		return Err(DedupeError::Config("Number of threads must be greater than 0".to_string()));
	}

	Ok(ConfigOptions {
		root: cli.root,
		num_threads: cli.num_threads,
		dry_run: cli.dry_run,
		assume_yes: cli.assume_yes,
	})
}

//Ask before anything is deleted, deletion can't be undone
fn confirm_deletion( plan: &DeletionPlan, config: &ConfigOptions, reporter: &ConsoleReporter ) -> bool {
	if config.assume_yes {
		return true;
	}

	reporter.finish();
	let prompt = format!("Are you sure you want to remove {} duplicates?", plan.len());
	match Confirm::new().with_prompt(prompt).default(false).interact() {
		Ok(answer) => answer,
		Err(e) => {
			warn!("Could not read confirmation, nothing will be deleted: {}", e);
			false
		}
	}
}

fn main() -> ExitCode {
	env_logger::Builder::from_env( env_logger::Env::default().default_filter_or("info") )
		.format_target(false)
		.init();

	let config = match set_config_options( Cli::parse() ) {
		Ok(config) => config,
		Err(e) => return exit_code( &Err(e) ),
	};

	//Ctrl-C stops scanning, hashing or deleting at the next file boundary
	let cancel = Arc::new( AtomicBool::new(false) );
	let handler_flag = Arc::clone( &cancel );
	if let Err(e) = ctrlc::set_handler(move || handler_flag.store(true, Ordering::SeqCst)) {
		warn!("Could not install the Ctrl-C handler: {}", e);
	}

	let classifier = Classifier::new( Arc::new(DiskStore), config.num_threads as usize, cancel );
	let reporter = ConsoleReporter::new();
	let mut run = DedupeRun::new( &classifier, &reporter, config.dry_run );

	let result = run.execute( &config.root, |plan| confirm_deletion( plan, &config, &reporter ) );
	reporter.finish();

	exit_code( &result )
}

//Anything short of a complete run is a failure: fatal errors, cancellation, or a file that couldn't be deleted
fn run_succeeded( result: &Result<RunOutcome, DedupeError> ) -> bool {
	match result {
		Ok(outcome) => {
			let delete_failed = outcome.deletion.as_ref().map_or(false, |report| !report.failed.is_empty());
			!(outcome.cancelled || delete_failed)
		},
		Err(e) => {
			if e.is_fatal() {
				error!("{}", e);
			}else{
				warn!("{}", e);
			}
			false
		}
	}
}

fn exit_code( result: &Result<RunOutcome, DedupeError> ) -> ExitCode {
	if run_succeeded( result ) {
		ExitCode::SUCCESS
	}else{
		ExitCode::FAILURE
	}
}
