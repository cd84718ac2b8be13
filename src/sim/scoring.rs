//! Deterministic scoring rules shared by every minigame

/// Bonus points for reaching `combo` consecutive correct answers.
///
/// Monotonic step function of combo length.
pub fn combo_bonus(combo: u32) -> u64 {
    match combo {
        0..=2 => 0,
        3..=4 => 5,
        5..=9 => 10,
        _ => 20,
    }
}

/// XP earned for a finished round.
///
/// Winning pays the full score scaled down, losing pays a consolation share.
pub fn round_xp(score: u64, won: bool, xp_per_round_cap: u64) -> u64 {
    let base = score / 10;
    let xp = if won { base + 10 } else { base / 2 };
    xp.min(xp_per_round_cap)
}
