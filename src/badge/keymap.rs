//! Linux input key codes to characters
//!
//! Badge readers emulate a US keyboard. Digits and punctuation are mapped
//! explicitly; letters and anything else fall back to the first character of
//! the key's symbolic name (`KEY_A` -> `a`).

use evdev::Key;

/// Characters produced by `key` without and with shift, US layout
pub fn us_chars(key: Key) -> Option<(char, char)> {
    let pair = match key {
        Key::KEY_1 => ('1', '!'),
        Key::KEY_2 => ('2', '@'),
        Key::KEY_3 => ('3', '#'),
        Key::KEY_4 => ('4', '$'),
        Key::KEY_5 => ('5', '%'),
        Key::KEY_6 => ('6', '^'),
        Key::KEY_7 => ('7', '&'),
        Key::KEY_8 => ('8', '*'),
        Key::KEY_9 => ('9', '('),
        Key::KEY_0 => ('0', ')'),
        Key::KEY_MINUS => ('-', '_'),
        Key::KEY_EQUAL => ('=', '+'),
        Key::KEY_LEFTBRACE => ('[', '{'),
        Key::KEY_RIGHTBRACE => (']', '}'),
        Key::KEY_SEMICOLON => (';', ':'),
        Key::KEY_APOSTROPHE => ('\'', '"'),
        Key::KEY_GRAVE => ('`', '~'),
        Key::KEY_BACKSLASH => ('\\', '|'),
        Key::KEY_COMMA => (',', '<'),
        Key::KEY_DOT => ('.', '>'),
        Key::KEY_SLASH => ('/', '?'),
        Key::KEY_SPACE => (' ', ' '),
        _ => return None,
    };
    Some(pair)
}

/// Best-effort transliteration of an unmapped key from its symbolic name
pub fn fallback_char(key: Key, shifted: bool) -> Option<char> {
    let name = format!("{:?}", key);
    let c = name.strip_prefix("KEY_")?.chars().next()?;
    Some(if shifted {
        c.to_ascii_uppercase()
    } else {
        c.to_ascii_lowercase()
    })
}

/// Character typed by `key`, honoring shift
pub fn key_char(key: Key, shifted: bool) -> Option<char> {
    match us_chars(key) {
        Some((normal, upper)) => Some(if shifted { upper } else { normal }),
        None => fallback_char(key, shifted),
    }
}

/// Check if a key is a shift modifier
pub fn is_shift(key: Key) -> bool {
    key == Key::KEY_LEFTSHIFT || key == Key::KEY_RIGHTSHIFT
}

/// Check if a key terminates a scan
pub fn is_enter(key: Key) -> bool {
    key == Key::KEY_ENTER || key == Key::KEY_KPENTER
}
