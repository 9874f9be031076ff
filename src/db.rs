pub mod geography_repo;
pub use geography_repo::GeographyRepository;
pub mod household_repo;
pub mod resident_repo;
pub mod privileged_repo;

pub mod store;
pub use store::RegistryStore;
pub mod pg_store;
pub use pg_store::PgStore;

#[cfg(test)]
pub mod memory_store;
#[cfg(test)]
pub use memory_store::MemoryStore;
