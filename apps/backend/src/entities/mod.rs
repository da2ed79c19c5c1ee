pub mod encounters;
pub mod transcripts;

pub use encounters::Entity as Encounters;
pub use encounters::Model as Encounter;
pub use transcripts::Entity as Transcripts;
pub use transcripts::Model as Transcript;
