pub use iso::{extract_springls, springls_in_cell};

mod iso;
