pub mod dbsessions;

pub use dbsessions::PgRepository;
