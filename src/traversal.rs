use std::ffi::OsStr;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use walkdir::WalkDir;

use crate::classifier::Reporter;
use crate::image_error::DedupeError;


//Extensions (lower case) that are considered to be photos
pub const KNOWN_EXTENSIONS: [&str; 7] = [ "jpg", "jpeg", "png", "tif", "tiff", "dng", "webp" ];

//Case insensitive test against the known extension list
pub fn valid_file_extension( fpath: &Path ) -> bool {
	match fpath.extension().and_then(OsStr::to_str) {
		Some(extension) => {
			let ext_lower = extension.to_lowercase();
			KNOWN_EXTENSIONS.contains( &ext_lower.as_str() )
		},
		None => false,
	}
}

/**
 * Recursively list every photo under root in a fixed order (sorted by name, depth first).
 *
 * A root that is missing or unreadable is fatal. A subdirectory that can't be
 * read is reported and skipped while its siblings are still enumerated.
 * Setting `cancel` stops the walk at the next entry.
 */
pub fn gather_image_files( root: &Path, reporter: &dyn Reporter, cancel: &AtomicBool ) -> Result<Vec<PathBuf>, DedupeError> {

	let root = match fs::canonicalize( root ) {
		Ok(root) => root,
		Err(e) => {
			return Err(DedupeError::Traversal(format!("Error: Failed to read directory {}: {}", root.display(), e)));
		}
	};

	if !root.is_dir() {
		return Err(DedupeError::Traversal(format!("Error: {} is not a directory", root.display())));
	}

	//Make sure the root itself can be listed before going any further
	if let Err(e) = fs::read_dir( &root ) {
		return Err(DedupeError::Traversal(format!("Error: Failed to read directory {}: {}", root.display(), e)));
	}

	reporter.status( &format!("Scanning directory: {}", root.display()) );

	let mut image_files = Vec::new();
	let walker = WalkDir::new( &root ).follow_links(false).sort_by_file_name();

	for entry in walker {
		if cancel.load(Ordering::SeqCst) {
			return Err(DedupeError::Cancelled(format!("Cancelled while scanning {} ({} images found so far)", root.display(), image_files.len())));
		}

		match entry {
			Ok(entry) => {
				if entry.file_type().is_file() && valid_file_extension( entry.path() ) {
					image_files.push( entry.into_path() );
				}
			},
			Err(e) => {
				if e.depth() == 0 {
					return Err(DedupeError::Traversal(format!("Error: Failed to read directory {}: {}", root.display(), e)));
				}

				let location = e.path().map(|p| p.display().to_string()).unwrap_or_default();
				let denied = e.io_error().map(|io| io.kind() == ErrorKind::PermissionDenied).unwrap_or(false);
				if denied {
					reporter.status( &format!("Skipping directory (permission denied): {}", location) );
				}else{
					reporter.status( &format!("Error: Failed to read {}: {}", location, e) );
				}
			},
		}
	}

	Ok(image_files)
}
