//! Pure 8-bit arithmetic and logic.
//!
//! Every operation returns its result alongside the zero and carry flags it produces. Writing the
//! flags back into the register file is the caller's job.

#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct Flags {
    pub zero: bool,
    pub carry: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AluResult {
    pub result: u8,
    pub flags: Flags,
}

impl AluResult {
    fn new(result: u8, carry: bool) -> Self {
        AluResult {
            result,
            flags: Flags {
                zero: result == 0,
                carry,
            },
        }
    }
}

pub fn add(a: u8, b: u8) -> AluResult {
    let (result, carry) = a.overflowing_add(b);
    AluResult::new(result, carry)
}

/// Carry is a borrow: set when `b` is larger than `a`.
pub fn sub(a: u8, b: u8) -> AluResult {
    AluResult::new(a.wrapping_sub(b), a < b)
}

pub fn and(a: u8, b: u8) -> AluResult {
    AluResult::new(a & b, false)
}

pub fn or(a: u8, b: u8) -> AluResult {
    AluResult::new(a | b, false)
}

pub fn xor(a: u8, b: u8) -> AluResult {
    AluResult::new(a ^ b, false)
}

pub fn inc(a: u8) -> AluResult {
    add(a, 1)
}

pub fn dec(a: u8) -> AluResult {
    sub(a, 1)
}

/// Never carries.
pub fn not(a: u8) -> AluResult {
    AluResult::new(!a, false)
}

/// Flags of `sub` without a result.
pub fn cmp(a: u8, b: u8) -> Flags {
    sub(a, b).flags
}

/// Flags of `and` without a result.
pub fn test(a: u8, b: u8) -> Flags {
    and(a, b).flags
}

/// Rotate left by `count` bits. Carry receives the last bit rotated out of bit 7.
pub fn rol(a: u8, count: u8, carry_in: bool) -> AluResult {
    shift_by(a, count, carry_in, |value, _| {
        let out = value & 0x80 != 0;
        ((value << 1) | out as u8, out)
    })
}

/// Rotate right by `count` bits. Carry receives the last bit rotated out of bit 0.
pub fn ror(a: u8, count: u8, carry_in: bool) -> AluResult {
    shift_by(a, count, carry_in, |value, _| {
        let out = value & 0x01 != 0;
        ((value >> 1) | ((out as u8) << 7), out)
    })
}

/// Rotate left through carry: a 9-bit rotation of `carry:a`.
pub fn rcl(a: u8, count: u8, carry_in: bool) -> AluResult {
    shift_by(a, count, carry_in, |value, carry| {
        ((value << 1) | carry as u8, value & 0x80 != 0)
    })
}

/// Rotate right through carry: a 9-bit rotation of `a:carry`.
pub fn rcr(a: u8, count: u8, carry_in: bool) -> AluResult {
    shift_by(a, count, carry_in, |value, carry| {
        ((value >> 1) | ((carry as u8) << 7), value & 0x01 != 0)
    })
}

pub fn shl(a: u8, count: u8, carry_in: bool) -> AluResult {
    shift_by(a, count, carry_in, |value, _| (value << 1, value & 0x80 != 0))
}

/// Logical shift right; bit 7 is filled with zero.
pub fn shr(a: u8, count: u8, carry_in: bool) -> AluResult {
    shift_by(a, count, carry_in, |value, _| (value >> 1, value & 0x01 != 0))
}

/// Arithmetic shift right; bit 7 is preserved.
pub fn sar(a: u8, count: u8, carry_in: bool) -> AluResult {
    shift_by(a, count, carry_in, |value, _| {
        ((value >> 1) | (value & 0x80), value & 0x01 != 0)
    })
}

// Apply a single-bit step `count` times. A count of zero leaves the carry untouched.
fn shift_by(a: u8, count: u8, carry_in: bool, step: impl Fn(u8, bool) -> (u8, bool)) -> AluResult {
    let mut value = a;
    let mut carry = carry_in;
    for _ in 0..count {
        (value, carry) = step(value, carry);
    }
    AluResult::new(value, carry)
}
