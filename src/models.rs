pub mod diagnostics;
pub mod geography;
pub mod household;
pub mod principal;
pub mod report;
pub mod resident;
