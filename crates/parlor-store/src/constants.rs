/// Maximum message content length, in characters.
pub const MAX_MESSAGE_CHARS: usize = 1000;

/// Maximum comment content length, in characters.
pub const MAX_COMMENT_CHARS: usize = 20;

/// Photos must be strictly smaller than this many bytes.
pub const MAX_PHOTO_BYTES: u64 = 20_000_000;

/// Participants in a direct conversation.
pub const DIRECT_PARTICIPANTS: usize = 2;

/// Minimum participants when creating a group.
pub const MIN_GROUP_PARTICIPANTS: usize = 3;

/// Profile / group picture used when none was set.
pub const DEFAULT_PHOTO_PATH: &str = "./images/defaultPP.png";

/// Content stored for a photo message sent without text.
pub const PHOTO_PLACEHOLDER: &str = "\u{1F4F7} Photo";
