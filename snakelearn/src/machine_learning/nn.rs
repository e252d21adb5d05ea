// nn.rs
pub mod dense;
