use std::path::Path;
use log::debug;

use crate::classifier::{ClassifySummary, Classifier, DeletionPlan, DeletionReport, Reporter};
use crate::image_error::DedupeError;
use crate::traversal;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
	Idle,
	Scanning,
	Hashing,
	Deleting,
	Done,
}

#[derive(Debug)]
pub struct RunOutcome {
	pub plan: DeletionPlan,
	pub summary: ClassifySummary,
	pub cancelled: bool,
	//None when nothing was deleted: no duplicates, dry run, cancelled or not confirmed
	pub deletion: Option<DeletionReport>,
}

/// One traversal of one root directory, from scanning to deletion.
pub struct DedupeRun<'a> {
	classifier: &'a Classifier,
	reporter: &'a dyn Reporter,
	dry_run: bool,
	state: RunState,
}

impl<'a> DedupeRun<'a> {

	pub fn new( classifier: &'a Classifier, reporter: &'a dyn Reporter, dry_run: bool ) -> DedupeRun<'a> {
		DedupeRun { classifier, reporter, dry_run, state: RunState::Idle }
	}

	pub fn state( &self ) -> RunState {
		self.state
	}

	fn enter( &mut self, state: RunState ) {
		debug!("Run state {:?} -> {:?}", self.state, state);
		self.state = state;
	}

	/**
	 * Scan root, fingerprint every photo and, if `confirm` agrees, delete the duplicates.
	 *
	 * Only a root that can't be enumerated, or a scan cancelled before it finished, is
	 * returned as an error, and in that case nothing has been hashed. Every per-file
	 * problem ends up in the report instead.
	 */
	pub fn execute<F>( &mut self, root: &Path, confirm: F ) -> Result<RunOutcome, DedupeError>
		where F: FnOnce(&DeletionPlan) -> bool
	{
		self.enter( RunState::Scanning );
		let files = match traversal::gather_image_files( root, self.reporter, self.classifier.cancel_flag() ) {
			Ok(files) => files,
			Err(e) => {
				self.enter( RunState::Done );
				return Err(e);
			}
		};

		let mut outcome = RunOutcome { plan: DeletionPlan::default(), summary: ClassifySummary::default(), cancelled: false, deletion: None };

		if files.is_empty() {
			self.reporter.status( "No images found." );
			self.enter( RunState::Done );
			return Ok(outcome);
		}

		self.enter( RunState::Hashing );
		let classification = self.classifier.process( &files, self.reporter );
		outcome.plan = classification.plan;
		outcome.summary = classification.summary;
		outcome.cancelled = classification.cancelled;

		let s = outcome.summary;
		self.reporter.status( &format!("Images hashed: {} Unique: {} Duplicates: {} Skipped: {}", s.scanned, s.unique, s.duplicates, s.skipped) );

		if outcome.cancelled || outcome.plan.is_empty() {
			if outcome.plan.is_empty() && !outcome.cancelled {
				self.reporter.status( "No duplicate images found." );
			}
			self.enter( RunState::Done );
			return Ok(outcome);
		}

		if self.dry_run {
			for path in outcome.plan.paths() {
				self.reporter.status( &format!("Would delete: {}", path.display()) );
			}
			self.enter( RunState::Done );
			return Ok(outcome);
		}

		if !confirm( &outcome.plan ) {
			self.reporter.status( "No files were deleted." );
			self.enter( RunState::Done );
			return Ok(outcome);
		}

		self.enter( RunState::Deleting );
		let report = self.classifier.apply_plan( &outcome.plan, self.reporter );
		self.reporter.status( &format!("Deleted: {} Failed: {} Not deleted: {}", report.deleted.len(), report.failed.len(), report.remaining.len()) );
		outcome.cancelled = !report.remaining.is_empty();
		outcome.deletion = Some(report);

		self.enter( RunState::Done );
		Ok(outcome)
	}
}
