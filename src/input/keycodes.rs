//! evdev keycode constants
//!
//! Consolidates all evdev key constants used throughout relayout.
//! These are Linux input event codes from <linux/input-event-codes.h>.

// ============================================================================
// Modifier Keys
// ============================================================================

/// Left Control key
pub const KEY_LEFTCTRL: u16 = 29;

/// Right Control key
pub const KEY_RIGHTCTRL: u16 = 97;

/// Left Shift key
pub const KEY_LEFTSHIFT: u16 = 42;

/// Right Shift key
pub const KEY_RIGHTSHIFT: u16 = 54;

/// Left Alt key
pub const KEY_LEFTALT: u16 = 56;

/// Right Alt key (AltGr on some keyboards)
pub const KEY_RIGHTALT: u16 = 100;

/// Left Super (Meta) key
pub const KEY_LEFTMETA: u16 = 125;

/// Right Super (Meta) key
pub const KEY_RIGHTMETA: u16 = 126;

/// Caps Lock key
pub const KEY_CAPSLOCK: u16 = 58;

// ============================================================================
// Navigation Keys
// ============================================================================

/// Left arrow key
pub const KEY_LEFT: u16 = 105;

/// Right arrow key
pub const KEY_RIGHT: u16 = 106;

/// Up arrow key
pub const KEY_UP: u16 = 103;

/// Down arrow key
pub const KEY_DOWN: u16 = 108;

/// Home key
pub const KEY_HOME: u16 = 102;

/// End key
pub const KEY_END: u16 = 107;

/// Page Up key
pub const KEY_PAGEUP: u16 = 104;

/// Page Down key
pub const KEY_PAGEDOWN: u16 = 109;

/// Tab key
pub const KEY_TAB: u16 = 15;

/// Enter key
pub const KEY_ENTER: u16 = 28;

/// Keypad Enter key
pub const KEY_KPENTER: u16 = 96;

// ============================================================================
// Editing Keys
// ============================================================================

/// Escape key
pub const KEY_ESC: u16 = 1;

/// Backspace key
pub const KEY_BACKSPACE: u16 = 14;

/// Space bar (end-of-word trigger)
pub const KEY_SPACE: u16 = 57;

/// Insert key
pub const KEY_INSERT: u16 = 110;

/// Delete key
pub const KEY_DELETE: u16 = 111;

/// A key (presence marks a device as a keyboard)
pub const KEY_A: u16 = 30;

/// V key (paste chord)
pub const KEY_V: u16 = 47;

// ============================================================================
// Mouse Buttons (BTN_* from linux/input-event-codes.h)
// ============================================================================

/// Left mouse button
pub const BTN_LEFT: u16 = 0x110;

/// Right mouse button
pub const BTN_RIGHT: u16 = 0x111;

/// Middle mouse button
pub const BTN_MIDDLE: u16 = 0x112;

/// Range of all mouse button codes (BTN_MOUSE..BTN_TASK)
const BTN_MOUSE_FIRST: u16 = 0x110;
const BTN_MOUSE_LAST: u16 = 0x117;

// ============================================================================
// US QWERTY key positions
// ============================================================================

/// Unshifted/shifted characters for keycodes 2..=53
const QWERTY: [(u16, char, char); 47] = [
    (2, '1', '!'),
    (3, '2', '@'),
    (4, '3', '#'),
    (5, '4', '$'),
    (6, '5', '%'),
    (7, '6', '^'),
    (8, '7', '&'),
    (9, '8', '*'),
    (10, '9', '('),
    (11, '0', ')'),
    (12, '-', '_'),
    (13, '=', '+'),
    (16, 'q', 'Q'),
    (17, 'w', 'W'),
    (18, 'e', 'E'),
    (19, 'r', 'R'),
    (20, 't', 'T'),
    (21, 'y', 'Y'),
    (22, 'u', 'U'),
    (23, 'i', 'I'),
    (24, 'o', 'O'),
    (25, 'p', 'P'),
    (26, '[', '{'),
    (27, ']', '}'),
    (30, 'a', 'A'),
    (31, 's', 'S'),
    (32, 'd', 'D'),
    (33, 'f', 'F'),
    (34, 'g', 'G'),
    (35, 'h', 'H'),
    (36, 'j', 'J'),
    (37, 'k', 'K'),
    (38, 'l', 'L'),
    (39, ';', ':'),
    (40, '\'', '"'),
    (41, '`', '~'),
    (43, '\\', '|'),
    (44, 'z', 'Z'),
    (45, 'x', 'X'),
    (46, 'c', 'C'),
    (47, 'v', 'V'),
    (48, 'b', 'B'),
    (49, 'n', 'N'),
    (50, 'm', 'M'),
    (51, ',', '<'),
    (52, '.', '>'),
    (53, '/', '?'),
];

// ============================================================================
// Helper Functions
// ============================================================================

/// Left-hand counterpart of a right-hand modifier; other keys map to themselves
#[inline]
pub const fn modifier_base(keycode: u16) -> u16 {
    match keycode {
        KEY_RIGHTSHIFT => KEY_LEFTSHIFT,
        KEY_RIGHTCTRL => KEY_LEFTCTRL,
        KEY_RIGHTALT => KEY_LEFTALT,
        KEY_RIGHTMETA => KEY_LEFTMETA,
        other => other,
    }
}

/// Check if keycode is a Shift key
#[inline]
pub const fn is_shift_key(keycode: u16) -> bool {
    keycode == KEY_LEFTSHIFT || keycode == KEY_RIGHTSHIFT
}

/// Check if keycode moves the caret or leaves the current line of text
#[inline]
pub const fn is_navigation_key(keycode: u16) -> bool {
    matches!(
        keycode,
        KEY_LEFT
            | KEY_RIGHT
            | KEY_UP
            | KEY_DOWN
            | KEY_HOME
            | KEY_END
            | KEY_PAGEUP
            | KEY_PAGEDOWN
            | KEY_TAB
            | KEY_ENTER
            | KEY_KPENTER
    )
}

/// Check if code is a pointer button rather than a key
#[inline]
pub const fn is_mouse_button(code: u16) -> bool {
    code >= BTN_MOUSE_FIRST && code <= BTN_MOUSE_LAST
}

/// Character produced by a key on a US QWERTY layout
pub fn key_to_char(keycode: u16, shift: bool) -> Option<char> {
    if keycode == KEY_SPACE {
        return Some(' ');
    }
    QWERTY
        .iter()
        .find(|(code, _, _)| *code == keycode)
        .map(|&(_, plain, shifted)| if shift { shifted } else { plain })
}

/// Keycode and shift state that type `ch` on a US QWERTY layout
pub fn char_to_key(ch: char) -> Option<(u16, bool)> {
    if ch == ' ' {
        return Some((KEY_SPACE, false));
    }
    QWERTY.iter().find_map(|&(code, plain, shifted)| {
        if ch == plain {
            Some((code, false))
        } else if ch == shifted {
            Some((code, true))
        } else {
            None
        }
    })
}

/// Resolve a key name as written in the config file ("shift", "space", "a", ...)
pub fn key_from_name(name: &str) -> Option<u16> {
    let name = name.trim().to_lowercase();
    let code = match name.as_str() {
        "shift" | "left_shift" | "lshift" => KEY_LEFTSHIFT,
        "right_shift" | "rshift" => KEY_RIGHTSHIFT,
        "ctrl" | "control" | "left_ctrl" | "lctrl" => KEY_LEFTCTRL,
        "right_ctrl" | "rctrl" => KEY_RIGHTCTRL,
        "alt" | "left_alt" | "lalt" => KEY_LEFTALT,
        "right_alt" | "ralt" | "altgr" => KEY_RIGHTALT,
        "super" | "meta" | "win" | "left_super" => KEY_LEFTMETA,
        "right_super" | "right_meta" => KEY_RIGHTMETA,
        "capslock" | "caps" => KEY_CAPSLOCK,
        "space" => KEY_SPACE,
        "enter" | "return" => KEY_ENTER,
        "tab" => KEY_TAB,
        "escape" | "esc" => KEY_ESC,
        "backspace" => KEY_BACKSPACE,
        "insert" | "ins" => KEY_INSERT,
        "delete" | "del" => KEY_DELETE,
        "left" => KEY_LEFT,
        "right" => KEY_RIGHT,
        "up" => KEY_UP,
        "down" => KEY_DOWN,
        "home" => KEY_HOME,
        "end" => KEY_END,
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(ch), None) => return char_to_key(ch).map(|(code, _)| code),
                _ => return None,
            }
        }
    };
    Some(code)
}

/// Parse a "+"-separated key combo ("super+space", "alt+shift")
pub fn parse_combo(combo: &str) -> Option<Vec<u16>> {
    combo
        .split('+')
        .filter(|part| !part.trim().is_empty())
        .map(key_from_name)
        .collect::<Option<Vec<_>>>()
        .filter(|keys| !keys.is_empty())
}
