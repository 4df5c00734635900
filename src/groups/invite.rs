use rand::Rng;

/// No 0/O or 1/I, so codes survive being read aloud.
const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const INVITE_CODE_LEN: usize = 6;

/// Random invite code. Uniqueness is not checked.
pub fn generate_invite_code() -> String {
    let mut rng = rand::thread_rng();
    (0..INVITE_CODE_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Codes are matched trimmed and uppercased.
pub fn normalize_invite_code(code: &str) -> String {
    code.trim().to_uppercase()
}
