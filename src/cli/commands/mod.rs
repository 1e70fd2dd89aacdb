pub mod hypothesis;
pub mod project;
pub mod prompt;
pub mod recover;
pub mod resource;
pub mod run;
