use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::imagehash::Fingerprint;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
	Unique,
	Duplicate,
}

/// Maps each fingerprint to the first file that produced it.
/// Scoped to one run; only the classifier's committing thread owns it.
#[derive(Debug, Default)]
pub struct DuplicateIndex {
	survivors: HashMap<Fingerprint, PathBuf>,
}

impl DuplicateIndex {

	pub fn new() -> DuplicateIndex {
		DuplicateIndex::default()
	}

	//First sighting is recorded and kept, any later sighting is a duplicate and leaves the index untouched
	pub fn classify( &mut self, fingerprint: Fingerprint, path: &Path ) -> Outcome {
		if self.survivors.contains_key( &fingerprint ) {
			return Outcome::Duplicate;
		}

		self.survivors.insert( fingerprint, path.to_path_buf() );
		Outcome::Unique
	}

	pub fn survivor( &self, fingerprint: &Fingerprint ) -> Option<&Path> {
		self.survivors.get( fingerprint ).map(|p| p.as_path())
	}

	pub fn len( &self ) -> usize {
		self.survivors.len()
	}

	pub fn is_empty( &self ) -> bool {
		self.survivors.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::imagehash::{interlace, BitString};

	fn fp( a: &str, b: &str ) -> Fingerprint {
		interlace( &a.parse::<BitString>().unwrap(), &b.parse::<BitString>().unwrap() )
	}

	#[test]
	fn test_first_sighting_is_unique() {
		let mut index = DuplicateIndex::new();
		assert!( index.is_empty() );
		assert_eq!( index.classify( fp("10", "01"), Path::new("/a.jpg") ), Outcome::Unique );
		assert_eq!( index.classify( fp("11", "01"), Path::new("/b.jpg") ), Outcome::Unique );
		assert_eq!( index.len(), 2 );
	}

	#[test]
	fn test_repeat_keeps_original_survivor() {
		let mut index = DuplicateIndex::new();
		index.classify( fp("10", "01"), Path::new("/a.jpg") );

		assert_eq!( index.classify( fp("10", "01"), Path::new("/b.jpg") ), Outcome::Duplicate );
		assert_eq!( index.classify( fp("10", "01"), Path::new("/a.jpg") ), Outcome::Duplicate, "Same file twice is still a duplicate" );
		assert_eq!( index.survivor( &fp("10", "01") ), Some(Path::new("/a.jpg")) );
		assert_eq!( index.len(), 1 );
	}

	#[test]
	fn test_unknown_fingerprint_has_no_survivor() {
		let index = DuplicateIndex::new();
		assert_eq!( index.survivor( &fp("1", "1") ), None );
	}
}
