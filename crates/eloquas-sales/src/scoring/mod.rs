// Prospect and email scoring: TrustScore, StoryScore, spam risk and the
// LinkedIn profile trust score feeding relationship strength.

pub mod linkedin;
pub mod spam;
pub mod story;
pub mod trust;

pub use linkedin::linkedin_trust_score;
pub use spam::{spam_score, SpamReport};
pub use story::{heuristic_story_score, score_story, StoryScore};
pub use trust::{trust_score, TrustComponents, TrustInputs, TrustScore};
