pub mod evaluating;
