// ABOUTME: Converts JSON-with-comments into plain JSON.
// ABOUTME: Strips line and block comments plus trailing commas outside of strings.

/// Strip `//` and `/* */` comments and trailing commas from `input`.
///
/// String literals are copied verbatim, including escaped quotes. Comment
/// bytes are replaced by spaces (newlines kept) so that parser error
/// positions still line up with the original file.
pub fn to_json(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        let b = input[i];
        match b {
            b'"' => {
                out.push(b);
                i += 1;
                while i < input.len() {
                    let c = input[i];
                    out.push(c);
                    i += 1;
                    if c == b'\\' && i < input.len() {
                        out.push(input[i]);
                        i += 1;
                    } else if c == b'"' {
                        break;
                    }
                }
            }
            b'/' if input.get(i + 1) == Some(&b'/') => {
                while i < input.len() && input[i] != b'\n' {
                    out.push(b' ');
                    i += 1;
                }
            }
            b'/' if input.get(i + 1) == Some(&b'*') => {
                out.extend_from_slice(b"  ");
                i += 2;
                while i < input.len() {
                    if input[i] == b'*' && input.get(i + 1) == Some(&b'/') {
                        out.extend_from_slice(b"  ");
                        i += 2;
                        break;
                    }
                    out.push(if input[i] == b'\n' { b'\n' } else { b' ' });
                    i += 1;
                }
            }
            b']' | b'}' => {
                blank_trailing_comma(&mut out);
                out.push(b);
                i += 1;
            }
            _ => {
                out.push(b);
                i += 1;
            }
        }
    }

    out
}

/// Replace a comma that is followed only by whitespace with a space.
fn blank_trailing_comma(out: &mut [u8]) {
    for byte in out.iter_mut().rev() {
        match byte {
            b' ' | b'\t' | b'\r' | b'\n' => continue,
            b',' => {
                *byte = b' ';
                return;
            }
            _ => return,
        }
    }
}
