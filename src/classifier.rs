use std::collections::BTreeMap;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::channel;
use std::sync::Arc;
use image::DynamicImage;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use threadpool::ThreadPool;

use crate::dupe_index::{DuplicateIndex, Outcome};
use crate::image_error::DedupeError;
use crate::imagehash::{self, Fingerprint};


/// Where decoded images come from and where duplicates are removed.
pub trait ImageStore: Send + Sync {
	fn decode( &self, path: &Path ) -> Result<DynamicImage, DedupeError>;
	fn remove( &self, path: &Path ) -> Result<(), DedupeError>;
}

/// Receives the running log of a dedupe run, in processing order.
pub trait Reporter {
	fn status( &self, line: &str );

	fn progress( &self, _done: u64, _total: u64 ) {}
}

//The real filesystem
pub struct DiskStore;

impl ImageStore for DiskStore {
	fn decode( &self, path: &Path ) -> Result<DynamicImage, DedupeError> {
		imagehash::load_image_from_file( path )
	}

	//Immediate and permanent, there is no recycle bin
	fn remove( &self, path: &Path ) -> Result<(), DedupeError> {
		fs::remove_file( path ).map_err(|e| DedupeError::DeleteFail(format!("Error deleting file {}: {}", path.display(), e)))
	}
}

/// Writes status lines through the log facade and keeps a progress bar underneath them.
pub struct ConsoleReporter {
	bar: ProgressBar,
}

impl ConsoleReporter {
	pub fn new() -> ConsoleReporter {
		let bar = ProgressBar::new(0);
		if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} images hashed") {
			bar.set_style(style);
		}
		ConsoleReporter { bar }
	}

	pub fn finish( &self ) {
		self.bar.finish_and_clear();
	}
}

impl Default for ConsoleReporter {
	fn default() -> Self {
		ConsoleReporter::new()
	}
}

impl Reporter for ConsoleReporter {
	fn status( &self, line: &str ) {
		//Printing while the bar is drawn garbles both
		self.bar.suspend(|| info!("{}", line));
	}

	fn progress( &self, done: u64, total: u64 ) {
		self.bar.set_length(total);
		self.bar.set_position(done);
		if done >= total {
			self.bar.finish_and_clear();
		}
	}
}

/// Files to delete, in the order their duplicate was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionPlan {
	paths: Vec<PathBuf>,
}

impl DeletionPlan {
	pub fn push( &mut self, path: PathBuf ) {
		self.paths.push( path );
	}

	pub fn paths( &self ) -> &[PathBuf] {
		&self.paths
	}

	pub fn len( &self ) -> usize {
		self.paths.len()
	}

	pub fn is_empty( &self ) -> bool {
		self.paths.is_empty()
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassifySummary {
	pub scanned: u64,
	pub unique: u64,
	pub duplicates: u64,
	pub skipped: u64,
}

#[derive(Debug)]
pub struct Classification {
	pub plan: DeletionPlan,
	pub summary: ClassifySummary,
	pub cancelled: bool,
}

#[derive(Debug, Default)]
pub struct DeletionReport {
	pub deleted: Vec<PathBuf>,
	pub failed: Vec<(PathBuf, DedupeError)>,
	//Planned files left alone because the run was cancelled
	pub remaining: Vec<PathBuf>,
}

//None means the worker saw the cancel flag and never opened the file
type HashResult = Option<Result<Fingerprint, DedupeError>>;

//Decode and hash one file. A panicking decoder only loses this file.
fn hash_file( store: &dyn ImageStore, path: &Path ) -> Result<Fingerprint, DedupeError> {
	match panic::catch_unwind( AssertUnwindSafe(|| store.decode( path ).map(|img| imagehash::fingerprint( &img ))) ) {
		Ok(result) => result,
		Err(_) => Err(DedupeError::DecodeFail(format!("Error processing file {}: decoder panicked", path.display()))),
	}
}

//Single writer state of one classification pass
#[derive(Default)]
struct Tally {
	index: DuplicateIndex,
	plan: DeletionPlan,
	summary: ClassifySummary,
}

impl Tally {
	fn commit( &mut self, path: &Path, result: Result<Fingerprint, DedupeError>, reporter: &dyn Reporter ) {
		match result {
			Ok(fingerprint) => {
				debug!("{} {}", fingerprint, path.display());
				match self.index.classify( fingerprint.clone(), path ) {
					Outcome::Unique => self.summary.unique += 1,
					Outcome::Duplicate => {
						if let Some(survivor) = self.index.survivor( &fingerprint ) {
							reporter.status( &format!("Duplicate of {}: {}", survivor.display(), path.display()) );
						}
						self.plan.push( path.to_path_buf() );
						self.summary.duplicates += 1;
					},
				}
				self.summary.scanned += 1;
			},
			Err(e) => {
				reporter.status( &e.to_string() );
				self.summary.skipped += 1;
			},
		}
	}
}

pub struct Classifier {
	store: Arc<dyn ImageStore>,
	num_threads: usize,
	cancel: Arc<AtomicBool>,
}

impl Classifier {

	pub fn new( store: Arc<dyn ImageStore>, num_threads: usize, cancel: Arc<AtomicBool> ) -> Classifier {
		Classifier { store, num_threads: num_threads.max(1), cancel }
	}

	pub fn cancel_flag( &self ) -> &AtomicBool {
		&self.cancel
	}

	fn is_cancelled( &self ) -> bool {
		self.cancel.load(Ordering::SeqCst)
	}

	/**
	 * Fingerprint every file and build the deletion plan.
	 *
	 * Decoding and hashing run on a thread pool, but results are committed to the
	 * index one at a time in the order of `files`, so the first file of each
	 * duplicate group always survives no matter which thread finishes first.
	 * Per-file errors are reported and the file is left out of both the index and
	 * the plan. Cancellation is honoured between files only.
	 */
	pub fn process( &self, files: &[PathBuf], reporter: &dyn Reporter ) -> Classification {
		let mut tally = Tally::default();
		let mut cancelled = false;

		let total = files.len();
		if total == 0 {
			return Classification { plan: tally.plan, summary: tally.summary, cancelled };
		}

		let pool = ThreadPool::new( self.num_threads.min(total) );
		let (tx, rx) = channel::<(usize, HashResult)>();

		for (position, path) in files.iter().enumerate() {
			let tx = tx.clone();
			let store = Arc::clone( &self.store );
			let cancel = Arc::clone( &self.cancel );
			let path = path.clone();
			pool.execute(move || {
				let result = if cancel.load(Ordering::SeqCst) {
					None
				}else{
					Some( hash_file( store.as_ref(), &path ) )
				};
				//The receiver is gone once the run is cancelled
				let _ = tx.send( (position, result) );
			});
		}
		drop(tx);

		//Results arrive in any order, hold them until every earlier file has been committed
		let mut pending: BTreeMap<usize, HashResult> = BTreeMap::new();
		let mut next: usize = 0;

		'receive: for (position, result) in rx.iter() {
			pending.insert( position, result );

			while let Some(result) = pending.remove( &next ) {
				match result {
					Some(result) if !self.is_cancelled() => tally.commit( &files[next], result, reporter ),
					_ => {
						cancelled = true;
						break 'receive;
					},
				}

				next += 1;
				reporter.progress( next as u64, total as u64 );
			}
		}

		//Every sender is gone. Anything still uncommitted never got a result from its worker.
		while !cancelled && next < total {
			if self.is_cancelled() {
				cancelled = true;
				break;
			}

			let result = match pending.remove( &next ).flatten() {
				Some(result) => result,
				None => Err(DedupeError::DecodeFail(format!("Error processing file {}: no result from worker", files[next].display()))),
			};
			tally.commit( &files[next], result, reporter );

			next += 1;
			reporter.progress( next as u64, total as u64 );
		}

		if cancelled {
			reporter.status( &format!("Cancelled after {} of {} files", next, total) );
		}

		Classification { plan: tally.plan, summary: tally.summary, cancelled }
	}

	//Delete every planned file. A failure is reported and the rest are still attempted.
	//Cancellation stops before the next file, never halfway through one.
	pub fn apply_plan( &self, plan: &DeletionPlan, reporter: &dyn Reporter ) -> DeletionReport {
		let mut report = DeletionReport::default();

		for (i, path) in plan.paths().iter().enumerate() {
			if self.is_cancelled() {
				report.remaining = plan.paths()[i..].to_vec();
				reporter.status( &format!("Cancelled, {} duplicates were not deleted", report.remaining.len()) );
				return report;
			}

			match self.store.remove( path ) {
				Ok(()) => {
					reporter.status( &format!("Deleted similar image: {}", path.display()) );
					report.deleted.push( path.clone() );
				},
				Err(e) => {
					reporter.status( &e.to_string() );
					report.failed.push( (path.clone(), e) );
				},
			}
		}

		reporter.status( "Similar images have been removed." );
		report
	}
}

#[cfg(test)]
pub mod tests {
	use super::*;
	use crate::imagehash::tests::ramp_image;
	use std::collections::{HashMap, HashSet};
	use std::sync::Mutex;

	#[derive(Default)]
	pub struct RecordingReporter {
		lines: Mutex<Vec<String>>,
	}

	impl RecordingReporter {
		pub fn lines( &self ) -> Vec<String> {
			self.lines.lock().unwrap().clone()
		}
	}

	impl Reporter for RecordingReporter {
		fn status( &self, line: &str ) {
			self.lines.lock().unwrap().push( line.to_string() );
		}
	}

	//Sets the cancel flag once a number of files are committed or a matching line is reported
	pub struct CancellingReporter {
		pub inner: RecordingReporter,
		cancel: Arc<AtomicBool>,
		after_commits: Option<u64>,
		after_status: Option<&'static str>,
	}

	impl CancellingReporter {
		pub fn after_commits( commits: u64, cancel: Arc<AtomicBool> ) -> Self {
			CancellingReporter { inner: RecordingReporter::default(), cancel, after_commits: Some(commits), after_status: None }
		}

		pub fn after_status( prefix: &'static str, cancel: Arc<AtomicBool> ) -> Self {
			CancellingReporter { inner: RecordingReporter::default(), cancel, after_commits: None, after_status: Some(prefix) }
		}
	}

	impl Reporter for CancellingReporter {
		fn status( &self, line: &str ) {
			self.inner.status( line );
			if self.after_status.map_or(false, |prefix| line.starts_with(prefix)) {
				self.cancel.store(true, Ordering::SeqCst);
			}
		}

		fn progress( &self, done: u64, _total: u64 ) {
			if self.after_commits.map_or(false, |n| done >= n) {
				self.cancel.store(true, Ordering::SeqCst);
			}
		}
	}

	//Images held in memory. A None entry is a file that fails to decode.
	#[derive(Default)]
	pub struct MemoryStore {
		images: HashMap<PathBuf, Option<DynamicImage>>,
		panics: HashSet<PathBuf>,
		locked: HashSet<PathBuf>,
		removed: Mutex<Vec<PathBuf>>,
	}

	impl MemoryStore {
		pub fn with_image( mut self, path: &str, img: DynamicImage ) -> Self {
			self.images.insert( PathBuf::from(path), Some(img) );
			self
		}

		pub fn with_corrupt( mut self, path: &str ) -> Self {
			self.images.insert( PathBuf::from(path), None );
			self
		}

		//Decoding this path panics like a broken codec would
		pub fn with_panic( mut self, path: &str ) -> Self {
			self.panics.insert( PathBuf::from(path) );
			self
		}

		pub fn with_locked( mut self, path: &str ) -> Self {
			self.locked.insert( PathBuf::from(path) );
			self
		}

		pub fn removed( &self ) -> Vec<PathBuf> {
			self.removed.lock().unwrap().clone()
		}
	}

	impl ImageStore for MemoryStore {
		fn decode( &self, path: &Path ) -> Result<DynamicImage, DedupeError> {
			if self.panics.contains( path ) {
				panic!("decoder blew up on {}", path.display());
			}
			match self.images.get( path ) {
				Some(Some(img)) => Ok(img.clone()),
				Some(None) => Err(DedupeError::DecodeFail(format!("Error processing file {}: corrupt", path.display()))),
				None => Err(DedupeError::FileError(format!("Error: Failed to read image file {}", path.display()))),
			}
		}

		fn remove( &self, path: &Path ) -> Result<(), DedupeError> {
			if self.locked.contains( path ) {
				return Err(DedupeError::DeleteFail(format!("Error deleting file {}: locked", path.display())));
			}
			self.removed.lock().unwrap().push( path.to_path_buf() );
			Ok(())
		}
	}

	fn paths( names: &[&str] ) -> Vec<PathBuf> {
		names.iter().map(PathBuf::from).collect()
	}

	//A, B and C share pixels, D is different
	fn abcd_store() -> MemoryStore {
		let same = ramp_image(120, 90, true);
		MemoryStore::default()
			.with_image("/p/A.jpg", same.clone())
			.with_image("/p/B.jpg", same.clone())
			.with_image("/p/C.jpg", same)
			.with_image("/p/D.jpg", ramp_image(120, 90, false))
	}

	fn classifier( store: MemoryStore, threads: usize ) -> (Classifier, Arc<MemoryStore>) {
		let store = Arc::new( store );
		let classifier = Classifier::new( store.clone(), threads, Arc::new(AtomicBool::new(false)) );
		(classifier, store)
	}

	#[test]
	fn test_three_copies_and_one_distinct() {
		let (classifier, _) = classifier( abcd_store(), 1 );
		let result = classifier.process( &paths(&["/p/A.jpg", "/p/B.jpg", "/p/C.jpg", "/p/D.jpg"]), &RecordingReporter::default() );

		assert_eq!( result.plan.paths(), paths(&["/p/B.jpg", "/p/C.jpg"]).as_slice() );
		assert_eq!( result.summary, ClassifySummary { scanned: 4, unique: 2, duplicates: 2, skipped: 0 } );
		assert!( !result.cancelled );
	}

	#[test]
	fn test_parallel_matches_sequential() {
		let order = paths(&["/p/C.jpg", "/p/D.jpg", "/p/A.jpg", "/p/B.jpg"]);
		let (sequential, _) = classifier( abcd_store(), 1 );
		let expected = sequential.process( &order, &RecordingReporter::default() ).plan;
		assert_eq!( expected.paths(), paths(&["/p/A.jpg", "/p/B.jpg"]).as_slice() );

		//Repeat to give the threads a chance to finish out of order
		for _ in 0..5 {
			let (parallel, _) = classifier( abcd_store(), 4 );
			assert_eq!( parallel.process( &order, &RecordingReporter::default() ).plan, expected );
		}
	}

	#[test]
	fn test_earliest_file_survives() {
		let (classifier, _) = classifier( abcd_store(), 3 );
		let reporter = RecordingReporter::default();
		let result = classifier.process( &paths(&["/p/D.jpg", "/p/B.jpg", "/p/A.jpg", "/p/C.jpg"]), &reporter );

		assert_eq!( result.plan.paths(), paths(&["/p/A.jpg", "/p/C.jpg"]).as_slice() );
		assert!( reporter.lines().iter().any(|l| l == "Duplicate of /p/B.jpg: /p/A.jpg") );
	}

	#[test]
	fn test_decode_failure_is_isolated() {
		let store = abcd_store().with_corrupt("/p/bad.png");
		let (classifier, store) = classifier( store, 2 );
		let reporter = RecordingReporter::default();

		let result = classifier.process( &paths(&["/p/A.jpg", "/p/bad.png", "/p/B.jpg", "/p/missing.jpg", "/p/C.jpg"]), &reporter );
		assert_eq!( result.plan.paths(), paths(&["/p/B.jpg", "/p/C.jpg"]).as_slice() );
		assert_eq!( result.summary.skipped, 2 );
		assert_eq!( result.summary.scanned, 3 );
		assert!( reporter.lines().iter().any(|l| l.contains("/p/bad.png")) );

		let report = classifier.apply_plan( &result.plan, &reporter );
		assert_eq!( store.removed(), paths(&["/p/B.jpg", "/p/C.jpg"]) );
		assert_eq!( report.deleted.len(), 2 );
	}

	#[test]
	fn test_locked_file_does_not_stop_deletion() {
		let (classifier, store) = classifier( abcd_store().with_locked("/p/B.jpg"), 1 );
		let reporter = RecordingReporter::default();
		let result = classifier.process( &paths(&["/p/A.jpg", "/p/B.jpg", "/p/C.jpg"]), &reporter );

		let report = classifier.apply_plan( &result.plan, &reporter );
		assert_eq!( store.removed(), paths(&["/p/C.jpg"]) );
		assert_eq!( report.deleted, paths(&["/p/C.jpg"]) );
		assert_eq!( report.failed.len(), 1 );
		assert_eq!( report.failed[0].0, PathBuf::from("/p/B.jpg") );

		let lines = reporter.lines();
		assert!( lines.iter().any(|l| l.starts_with("Error deleting file /p/B.jpg")) );
		assert_eq!( lines.last().map(String::as_str), Some("Similar images have been removed.") );
	}

	#[test]
	fn test_repeated_runs_are_identical() {
		let order = paths(&["/p/B.jpg", "/p/D.jpg", "/p/C.jpg", "/p/A.jpg"]);
		let (classifier, _) = classifier( abcd_store(), 4 );
		let first = classifier.process( &order, &RecordingReporter::default() );
		let second = classifier.process( &order, &RecordingReporter::default() );
		assert_eq!( first.plan, second.plan );
		assert_eq!( first.summary, second.summary );
	}

	#[test]
	fn test_empty_file_list() {
		let (classifier, _) = classifier( abcd_store(), 4 );
		let result = classifier.process( &[], &RecordingReporter::default() );
		assert!( result.plan.is_empty() );
		assert_eq!( result.summary, ClassifySummary::default() );
	}

	#[test]
	fn test_cancelled_before_start_commits_nothing() {
		let store = Arc::new( abcd_store() );
		let cancel = Arc::new( AtomicBool::new(true) );
		let classifier = Classifier::new( store, 2, cancel );
		let reporter = RecordingReporter::default();

		let result = classifier.process( &paths(&["/p/A.jpg", "/p/B.jpg"]), &reporter );
		assert!( result.cancelled );
		assert!( result.plan.is_empty() );
		assert_eq!( result.summary.scanned, 0 );
		assert!( reporter.lines().iter().any(|l| l.starts_with("Cancelled after 0 of 2")) );
	}

	#[test]
	fn test_panicking_decoder_only_loses_that_file() {
		let (classifier, _) = classifier( abcd_store().with_panic("/p/bad.jpg"), 2 );
		let reporter = RecordingReporter::default();

		let result = classifier.process( &paths(&["/p/A.jpg", "/p/bad.jpg", "/p/B.jpg", "/p/C.jpg"]), &reporter );
		assert_eq!( result.plan.paths(), paths(&["/p/B.jpg", "/p/C.jpg"]).as_slice() );
		assert_eq!( result.summary, ClassifySummary { scanned: 3, unique: 1, duplicates: 2, skipped: 1 } );
		assert!( !result.cancelled );
		assert!( reporter.lines().iter().any(|l| l == "Error processing file /p/bad.jpg: decoder panicked") );
	}

	#[test]
	fn test_cancel_midway_keeps_earlier_commits() {
		let cancel = Arc::new( AtomicBool::new(false) );
		let classifier = Classifier::new( Arc::new(abcd_store()), 2, cancel.clone() );
		let reporter = CancellingReporter::after_commits( 2, cancel );

		let result = classifier.process( &paths(&["/p/A.jpg", "/p/B.jpg", "/p/C.jpg", "/p/D.jpg"]), &reporter );
		assert!( result.cancelled );
		assert_eq!( result.plan.paths(), paths(&["/p/B.jpg"]).as_slice(), "C was never committed" );
		assert_eq!( result.summary.scanned, 2 );
		assert!( reporter.inner.lines().iter().any(|l| l == "Cancelled after 2 of 4 files") );
	}

	#[test]
	fn test_cancel_stops_deletion_between_files() {
		let cancel = Arc::new( AtomicBool::new(false) );
		let store = Arc::new( abcd_store() );
		let classifier = Classifier::new( store.clone(), 1, cancel.clone() );
		let plan = classifier.process( &paths(&["/p/A.jpg", "/p/B.jpg", "/p/C.jpg", "/p/D.jpg"]), &RecordingReporter::default() ).plan;
		assert_eq!( plan.len(), 2 );

		let reporter = CancellingReporter::after_status( "Deleted similar image", cancel );
		let report = classifier.apply_plan( &plan, &reporter );

		assert_eq!( store.removed(), paths(&["/p/B.jpg"]) );
		assert_eq!( report.deleted, paths(&["/p/B.jpg"]) );
		assert_eq!( report.remaining, paths(&["/p/C.jpg"]) );
		let lines = reporter.inner.lines();
		assert!( lines.iter().any(|l| l == "Cancelled, 1 duplicates were not deleted") );
		assert!( !lines.iter().any(|l| l == "Similar images have been removed.") );
	}
}
