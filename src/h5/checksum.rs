//! Jenkins lookup3 `hashlittle`, the checksum of every HDF5 metadata block.

/// Checksums `data` the way the HDF5 library checksums superblocks, object headers and indices.
pub(crate) fn lookup3(data: &[u8]) -> u32 {
	let mut a = 0xdead_beef_u32.wrapping_add(data.len() as u32);
	let mut b = a;
	let mut c = a;
	let mut rest = data;
	while rest.len() > 12 {
		a = a.wrapping_add(word(&rest[0..4]));
		b = b.wrapping_add(word(&rest[4..8]));
		c = c.wrapping_add(word(&rest[8..12]));
		mix(&mut a, &mut b, &mut c);
		rest = &rest[12..];
	}
	if rest.is_empty() {
		return c;
	}
	// Zero-padding the tail is equivalent to the byte-wise fall-through of the reference.
	let mut tail = [0u8; 12];
	tail[..rest.len()].copy_from_slice(rest);
	a = a.wrapping_add(word(&tail[0..4]));
	b = b.wrapping_add(word(&tail[4..8]));
	c = c.wrapping_add(word(&tail[8..12]));
	final_mix(&mut a, &mut b, &mut c);
	c
}

fn word(bytes: &[u8]) -> u32 {
	u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn mix(a: &mut u32, b: &mut u32, c: &mut u32) {
	*a = a.wrapping_sub(*c);
	*a ^= c.rotate_left(4);
	*c = c.wrapping_add(*b);
	*b = b.wrapping_sub(*a);
	*b ^= a.rotate_left(6);
	*a = a.wrapping_add(*c);
	*c = c.wrapping_sub(*b);
	*c ^= b.rotate_left(8);
	*b = b.wrapping_add(*a);
	*a = a.wrapping_sub(*c);
	*a ^= c.rotate_left(16);
	*c = c.wrapping_add(*b);
	*b = b.wrapping_sub(*a);
	*b ^= a.rotate_left(19);
	*a = a.wrapping_add(*c);
	*c = c.wrapping_sub(*b);
	*c ^= b.rotate_left(4);
	*b = b.wrapping_add(*a);
}

fn final_mix(a: &mut u32, b: &mut u32, c: &mut u32) {
	*c ^= *b;
	*c = c.wrapping_sub(b.rotate_left(14));
	*a ^= *c;
	*a = a.wrapping_sub(c.rotate_left(11));
	*b ^= *a;
	*b = b.wrapping_sub(a.rotate_left(25));
	*c ^= *b;
	*c = c.wrapping_sub(b.rotate_left(16));
	*a ^= *c;
	*a = a.wrapping_sub(c.rotate_left(4));
	*b ^= *a;
	*b = b.wrapping_sub(a.rotate_left(14));
	*c ^= *b;
	*c = c.wrapping_sub(b.rotate_left(24));
}
