//! Rich Text Format to plain text
//!
//! Walks the RTF token stream keeping a group stack, emits document text and
//! skips destinations that carry no body text (font/colour tables, pictures,
//! metadata, `\*` ignorable groups).

/// Destinations whose content is never body text
const SKIPPED_DESTINATIONS: &[&str] = &[
    "fonttbl", "colortbl", "stylesheet", "info", "pict", "object", "objdata",
    "header", "headerl", "headerr", "headerf", "footer", "footerl", "footerr",
    "footerf", "listtable", "listoverridetable", "revtbl", "rsidtbl", "xmlnstbl",
    "themedata", "colorschememapping", "datastore", "latentstyles", "generator",
    "filetbl", "fldinst", "bkmkstart", "bkmkend",
];

#[derive(Clone, Copy)]
struct GroupState {
    skip: bool,
    unicode_skip: usize,
}

/// Convert RTF source into plain text
pub fn rtf_to_text(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() / 2);
    let mut stack: Vec<GroupState> = Vec::new();
    let mut state = GroupState {
        skip: false,
        unicode_skip: 1,
    };
    // Fallback characters still to drop after a \uN escape
    let mut pending_skip = 0usize;
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '{' => {
                stack.push(state);
                pending_skip = 0;
                i += 1;
            }
            '}' => {
                if let Some(prev) = stack.pop() {
                    state = prev;
                }
                pending_skip = 0;
                i += 1;
            }
            '\\' => {
                i += 1;
                let Some(&next) = chars.get(i) else {
                    break;
                };

                if next.is_ascii_alphabetic() {
                    let start = i;
                    while i < chars.len() && chars[i].is_ascii_alphabetic() {
                        i += 1;
                    }
                    let word: String = chars[start..i].iter().collect();

                    let param_start = i;
                    if i < chars.len() && chars[i] == '-' {
                        i += 1;
                    }
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                    let param: Option<i32> = if i > param_start {
                        chars[param_start..i].iter().collect::<String>().parse().ok()
                    } else {
                        None
                    };
                    // A single space delimits the control word
                    if i < chars.len() && chars[i] == ' ' {
                        i += 1;
                    }

                    if word == "bin" {
                        i += param.unwrap_or(0).max(0) as usize;
                        continue;
                    }
                    if SKIPPED_DESTINATIONS.contains(&word.as_str()) {
                        state.skip = true;
                        continue;
                    }
                    if word == "uc" {
                        state.unicode_skip = param.unwrap_or(1).max(0) as usize;
                        continue;
                    }
                    if state.skip {
                        continue;
                    }
                    if word == "u" {
                        if let Some(code) = param {
                            let code = if code < 0 { code + 65536 } else { code } as u32;
                            if let Some(ch) = char::from_u32(code) {
                                out.push(ch);
                            }
                            pending_skip = state.unicode_skip;
                        }
                        continue;
                    }
                    if let Some(text) = control_word_text(&word) {
                        out.push_str(text);
                    }
                } else {
                    i += 1;
                    match next {
                        '*' => state.skip = true,
                        '\'' => {
                            let hex: String = chars.iter().skip(i).take(2).collect();
                            i += hex.len();
                            if state.skip {
                                continue;
                            }
                            if pending_skip > 0 {
                                pending_skip -= 1;
                                continue;
                            }
                            if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                                out.push(cp1252_char(byte));
                            }
                        }
                        '\\' | '{' | '}' if !state.skip => out.push(next),
                        '~' if !state.skip => out.push(' '),
                        '_' if !state.skip => out.push('-'),
                        '\n' | '\r' if !state.skip => out.push('\n'),
                        _ => {}
                    }
                }
            }
            '\r' | '\n' => i += 1,
            _ => {
                i += 1;
                if state.skip {
                    continue;
                }
                if pending_skip > 0 {
                    pending_skip -= 1;
                    continue;
                }
                out.push(c);
            }
        }
    }

    out
}

/// Text emitted by control words that stand for characters or breaks
fn control_word_text(word: &str) -> Option<&'static str> {
    Some(match word {
        "par" | "line" | "sect" | "page" | "row" => "\n",
        "tab" | "cell" => "\t",
        "emdash" => "\u{2014}",
        "endash" => "\u{2013}",
        "bullet" => "\u{2022}",
        "lquote" => "\u{2018}",
        "rquote" => "\u{2019}",
        "ldblquote" => "\u{201C}",
        "rdblquote" => "\u{201D}",
        "emspace" | "enspace" | "qmspace" => " ",
        _ => return None,
    })
}

/// Map a Windows-1252 byte to its character
fn cp1252_char(byte: u8) -> char {
    match byte {
        0x80 => '\u{20AC}',
        0x85 => '\u{2026}',
        0x91 => '\u{2018}',
        0x92 => '\u{2019}',
        0x93 => '\u{201C}',
        0x94 => '\u{201D}',
        0x95 => '\u{2022}',
        0x96 => '\u{2013}',
        0x97 => '\u{2014}',
        0x99 => '\u{2122}',
        other => other as char,
    }
}
