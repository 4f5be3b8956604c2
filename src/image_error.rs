use thiserror::Error;


/// DedupeError enumerates all possible errors raised while removing duplicates.
/// Only `Traversal` and `Config` are fatal for a run, the rest are per-file.
#[derive(Error, Debug)]
pub enum DedupeError {

	//Could not open or stat the file
	#[error("{0}")]
	FileError(String),

	//Read access to a file or directory was refused
	#[error("{0}")]
	PermissionDenied(String),

	//The image library couldn't decode the file as an image
	#[error("{0}")]
	DecodeFail(String),

	//The file could not be removed (locked, read only, vanished)
	#[error("{0}")]
	DeleteFail(String),

	//The root directory itself could not be enumerated
	#[error("{0}")]
	Traversal(String),

	//A bit string containing something other than 0 or 1
	#[error("Invalid bit string: {0}")]
	InvalidBitString(String),

	//Grid dimensions don't match the number of cells supplied
	#[error("{0}")]
	InvalidGrid(String),

	//Ctrl-C before the file list was complete
	#[error("{0}")]
	Cancelled(String),

	//Bad command line option
	#[error("{0}")]
	Config(String),
}

impl DedupeError {

	//Per-file errors are skipped and logged, the others stop the run.
	//A cancelled scan stops the run too but isn't a failure of the input.
	pub fn is_fatal(&self) -> bool {
		matches!(self, DedupeError::Traversal(_) | DedupeError::Config(_))
	}
}
