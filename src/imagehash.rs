extern crate image;

use std::fmt;
use std::io::ErrorKind;
use std::path::Path;
use std::str::FromStr;
use image::{DynamicImage, GenericImageView};
use image::imageops::FilterType;
use image::io::Reader;

use crate::image_error::DedupeError;


//Size of the row-major grid (width, height). One extra column so each row gives 8 comparisons.
pub const GRID_A_SIZE: (u32, u32) = (9, 8);
//Size of the column-major grid (width, height).
pub const GRID_B_SIZE: (u32, u32) = (8, 9);

/// A small greyscale resampling of an image. Cells are stored row by row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LuminanceGrid {
	pub width: u32,
	pub height: u32,
	cells: Vec<u8>,
}

/// An ordered run of '0' and '1' digits, one per adjacent cell comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BitString(String);

/// Two interlaced bit strings. Used as the exact-match deduplication key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

//Weighted luminance of one pixel, truncated towards zero
pub fn luminance( rgb: [u8; 3] ) -> u8 {
	let l = 0.30 * rgb[0] as f64 + 0.59 * rgb[1] as f64 + 0.11 * rgb[2] as f64;
	l as u8
}

impl LuminanceGrid {

	//Resample the image to exactly width x height with a bicubic filter and take the luminance of each cell
	pub fn from_image( img: &DynamicImage, width: u32, height: u32 ) -> LuminanceGrid {
		let scaled = img.resize_exact( width, height, FilterType::CatmullRom ).to_rgb8();
		let cells = scaled.pixels().map(|p| luminance( p.0 )).collect();

		LuminanceGrid { width, height, cells }
	}

	pub fn from_cells( width: u32, height: u32, cells: Vec<u8> ) -> Result<LuminanceGrid, DedupeError> {
		if width == 0 || height == 0 || cells.len() != (width as usize) * (height as usize) {
			return Err(DedupeError::InvalidGrid(format!("Error: {} cells do not fill a {}x{} grid", cells.len(), width, height)));
		}
		Ok(LuminanceGrid { width, height, cells })
	}

	pub fn get( &self, x: u32, y: u32 ) -> u8 {
		self.cells[(y * self.width + x) as usize]
	}
}

/// Downsample an image into the 9x8 and 8x9 grids the fingerprint is built from.
/// Works for any source of at least 1x1 pixels.
pub fn sample( img: &DynamicImage ) -> (LuminanceGrid, LuminanceGrid) {
	let grid_a = LuminanceGrid::from_image( img, GRID_A_SIZE.0, GRID_A_SIZE.1 );
	let grid_b = LuminanceGrid::from_image( img, GRID_B_SIZE.0, GRID_B_SIZE.1 );
	(grid_a, grid_b)
}

/**
 * Scan the grid top to bottom, left to right and emit one digit per
 * horizontally adjacent pair: 1 when the left cell is brighter, otherwise 0.
 * Output length is height * (width - 1).
 */
pub fn bitstring( grid: &LuminanceGrid ) -> BitString {
	let mut bits = String::with_capacity( (grid.height * grid.width.saturating_sub(1)) as usize );

	for y in 0..grid.height {
		for x in 0..grid.width.saturating_sub(1) {
			if grid.get(x, y) > grid.get(x + 1, y) {
				bits.push('1');
			}else{
				bits.push('0');
			}
		}
	}

	BitString(bits)
}

/**
 * Alternate the digits of both strings while both have digits left, then
 * append whatever remains of the longer one unchanged.
 */
pub fn interlace( hash1: &BitString, hash2: &BitString ) -> Fingerprint {
	let a = hash1.0.as_bytes();
	let b = hash2.0.as_bytes();
	let min_len = a.len().min(b.len());

	let mut out = String::with_capacity( a.len() + b.len() );
	for i in 0..min_len {
		out.push( a[i] as char );
		out.push( b[i] as char );
	}

	//Only one of these is non-empty
	out.push_str( &hash1.0[min_len..] );
	out.push_str( &hash2.0[min_len..] );

	Fingerprint(out)
}

//Sample, encode and interlace in one step
pub fn fingerprint( img: &DynamicImage ) -> Fingerprint {
	let (grid_a, grid_b) = sample( img );
	interlace( &bitstring( &grid_a ), &bitstring( &grid_b ) )
}

impl BitString {
	pub fn len( &self ) -> usize {
		self.0.len()
	}

	pub fn is_empty( &self ) -> bool {
		self.0.is_empty()
	}

	pub fn as_str( &self ) -> &str {
		&self.0
	}
}

impl FromStr for BitString {
	type Err = DedupeError;

	fn from_str( s: &str ) -> Result<Self, Self::Err> {
		if s.chars().all(|c| c == '0' || c == '1') {
			Ok(BitString(s.to_string()))
		}else{
			Err(DedupeError::InvalidBitString(s.to_string()))
		}
	}
}

impl fmt::Display for BitString {
	fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
		f.write_str( &self.0 )
	}
}

impl Fingerprint {
	pub fn len( &self ) -> usize {
		self.0.len()
	}

	pub fn is_empty( &self ) -> bool {
		self.0.is_empty()
	}

	pub fn as_str( &self ) -> &str {
		&self.0
	}
}

impl fmt::Display for Fingerprint {
	fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
		f.write_str( &self.0 )
	}
}

//Open an image from the specific path
//Tries to guess the format from the content rather than trusting the extension
pub fn load_image_from_file( image_path: &Path ) -> Result<DynamicImage, DedupeError> {

	let img = match Reader::open(image_path) {
		Ok(image) => image,
		Err(e) if e.kind() == ErrorKind::PermissionDenied => {
			return Err(DedupeError::PermissionDenied(format!("Skipping file (permission denied): {}", image_path.display())));
		},
		Err(e) => {
			return Err(DedupeError::FileError(format!("Error: Failed to read image file {}: {}", image_path.display(), e)));
		},
	};

	let format_guessed = match img.with_guessed_format() {
		Ok( format_guessed ) => format_guessed,
		Err(_) => {
			return Err(DedupeError::DecodeFail(format!("Error: Failed to identify image file format {}", image_path.display())));
		}
	};

	let decoded_img = match format_guessed.decode() {
		Ok( decoded_img ) => decoded_img,
		Err(e) => {
			return Err(DedupeError::DecodeFail(format!("Error processing file {}: {}", image_path.display(), e)));
		}
	};

	let (width, height) = decoded_img.dimensions();
	if width == 0 || height == 0 {
		return Err(DedupeError::DecodeFail(format!("Error processing file {}: image has no pixels", image_path.display())));
	}

	Ok(decoded_img)
}
