/// Random base-36 identifier for workspace directory names.
pub fn gen_random_id(length: usize) -> String {
    (0..length)
        .map(|_| char::from_digit(fastrand::u32(0..36), 36).unwrap())
        .collect()
}
