//! A storage engine for the [Oxford Common File Layout](https://ocfl.io/): a versioned,
//! content-addressed, self-describing object-store format. The repository API supports
//! creating, updating, reading, describing, validating, exporting, importing, rolling
//! back, and replicating OCFL objects over a pluggable storage backend.

pub mod ocfl;
