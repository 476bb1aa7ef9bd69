//! Emoji recognition and the built-in emoji description catalogue.

use regex::Regex;

/// One emoji: a pictograph with optional variation selector and skin-tone
/// modifier, or a regional-indicator flag pair.
pub const EMOJI_PATTERN: &str =
    r"(?:\p{Extended_Pictographic}[\x{FE0F}\x{1F3FB}-\x{1F3FF}]*|[\x{1F1E6}-\x{1F1FF}]{2})";

/// Compile a regex matching a whole string made only of emoji
pub fn whole_emoji_regex() -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{EMOJI_PATTERN})+$"))
}

/// Emoji and their plain-text descriptions
pub const EMOJI_CATALOGUE: &[(&str, &str)] = &[
    ("😀", "grinning face"),
    ("😃", "grinning face with big eyes"),
    ("😄", "grinning face with smiling eyes"),
    ("😁", "beaming face with smiling eyes"),
    ("😆", "grinning squinting face"),
    ("😅", "grinning face with sweat"),
    ("🤣", "rolling on the floor laughing"),
    ("😂", "face with tears of joy"),
    ("🙂", "slightly smiling face"),
    ("🙃", "upside-down face"),
    ("😉", "winking face"),
    ("😊", "smiling face with smiling eyes"),
    ("😇", "smiling face with halo"),
    ("🥰", "smiling face with hearts"),
    ("😍", "smiling face with heart-eyes"),
    ("🤩", "star-struck"),
    ("😘", "face blowing a kiss"),
    ("😋", "face savoring food"),
    ("😜", "winking face with tongue"),
    ("🤪", "zany face"),
    ("🤗", "smiling face with open hands"),
    ("🤔", "thinking face"),
    ("🤨", "face with raised eyebrow"),
    ("😐", "neutral face"),
    ("😑", "expressionless face"),
    ("😶", "face without mouth"),
    ("🙄", "face with rolling eyes"),
    ("😏", "smirking face"),
    ("😬", "grimacing face"),
    ("😌", "relieved face"),
    ("😔", "pensive face"),
    ("😴", "sleeping face"),
    ("😷", "face with medical mask"),
    ("🤒", "face with thermometer"),
    ("🤢", "nauseated face"),
    ("🥵", "hot face"),
    ("🥶", "cold face"),
    ("🤯", "exploding head"),
    ("🥳", "partying face"),
    ("😎", "smiling face with sunglasses"),
    ("🤓", "nerd face"),
    ("😕", "confused face"),
    ("😟", "worried face"),
    ("😮", "face with open mouth"),
    ("😲", "astonished face"),
    ("😳", "flushed face"),
    ("🥺", "pleading face"),
    ("😢", "crying face"),
    ("😭", "loudly crying face"),
    ("😱", "face screaming in fear"),
    ("😩", "weary face"),
    ("😫", "tired face"),
    ("😤", "face with steam from nose"),
    ("😡", "enraged face"),
    ("😠", "angry face"),
    ("💀", "skull"),
    ("💩", "pile of poo"),
    ("🤡", "clown face"),
    ("👻", "ghost"),
    ("🙈", "see-no-evil monkey"),
    ("❤️", "red heart"),
    ("❤", "red heart"),
    ("🧡", "orange heart"),
    ("💛", "yellow heart"),
    ("💚", "green heart"),
    ("💙", "blue heart"),
    ("💜", "purple heart"),
    ("🖤", "black heart"),
    ("💔", "broken heart"),
    ("💕", "two hearts"),
    ("💖", "sparkling heart"),
    ("💯", "hundred points"),
    ("💥", "collision"),
    ("💪", "flexed biceps"),
    ("👋", "waving hand"),
    ("👌", "ok hand"),
    ("✌️", "victory hand"),
    ("🤞", "crossed fingers"),
    ("👍", "thumbs up"),
    ("👎", "thumbs down"),
    ("👏", "clapping hands"),
    ("🙌", "raising hands"),
    ("🙏", "folded hands"),
    ("👀", "eyes"),
    ("🔥", "fire"),
    ("✨", "sparkles"),
    ("🎉", "party popper"),
    ("🎂", "birthday cake"),
    ("🎁", "wrapped gift"),
    ("☀️", "sun"),
    ("🌈", "rainbow"),
    ("⭐", "star"),
    ("🍕", "pizza"),
    ("🍺", "beer mug"),
    ("🍷", "wine glass"),
    ("☕", "hot beverage"),
    ("🐶", "dog face"),
    ("🐱", "cat face"),
    ("🚗", "automobile"),
    ("✈️", "airplane"),
    ("🏠", "house"),
    ("📱", "mobile phone"),
    ("✅", "check mark button"),
    ("❌", "cross mark"),
    ("❓", "red question mark"),
    ("‼️", "double exclamation mark"),
    ("🤷", "person shrugging"),
    ("🤦", "person facepalming"),
];
