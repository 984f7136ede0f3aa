pub mod subscription;
pub mod trash;
