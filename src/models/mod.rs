//! Entity types for the discography store.
//!
//! Every table row carries a UUID surrogate key plus created_at/updated_at
//! timestamps; uniqueness contracts live in the schema and are restated on
//! each type.

pub mod contribution;
pub mod image;
pub mod imagery;
pub mod instrument;
pub mod links;
pub mod performer;
pub mod recording;
pub mod release;
pub mod song;
pub mod streaming;

pub use contribution::UserContribution;
pub use image::{ArtistImage, Image, ImageLicense};
pub use imagery::{ImageType, ImagerySource, ReleaseImagery};
pub use instrument::Instrument;
pub use links::{PerformerRole, RecordingPerformer, RecordingRelease};
pub use performer::{ArtistType, Performer};
pub use recording::Recording;
pub use release::Release;
pub use song::Song;
pub use streaming::{
    MatchMethod, RecordingReleaseStreamingLink, ReleaseStreamingLink, StreamingService,
};
