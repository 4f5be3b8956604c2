//! Finds photos that look the same and removes all but the first copy of each.
//!
//! Every image is shrunk to a 9x8 and an 8x9 greyscale grid, each grid is turned
//! into a difference hash and the two hashes are interlaced into a fingerprint.
//! Files whose fingerprint has already been seen earlier in the traversal are
//! planned for deletion. Matching is exact, there is no similarity threshold.

pub mod classifier;
pub mod dupe_index;
pub mod image_error;
pub mod imagehash;
pub mod run;
pub mod traversal;
