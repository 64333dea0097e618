/// Render a key of `bits` significant low bits as hex, for log messages.
pub fn hex_key(key: u64, bits: u32) -> String {
	let bytes = ((bits + 7) / 8).max(1) as usize;
	hex::encode(&key.to_be_bytes()[8 - bytes..])
}
