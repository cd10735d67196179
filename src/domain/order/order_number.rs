use chrono::{DateTime, Utc};
use rand::RngCore;

const BASE36_DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// `ORD-` + base36 creation millis + 12 hex chars from the OS-seeded CSPRNG.
/// Not monotonic; uniqueness comes from the random suffix.
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let mut random = [0u8; 6];
    rand::thread_rng().fill_bytes(&mut random);

    let millis = u64::try_from(now.timestamp_millis()).unwrap_or_default();
    format!("ORD-{}{}", to_base36(millis), hex::encode(random))
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }

    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36_DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();

    String::from_utf8(digits).unwrap_or_default()
}
