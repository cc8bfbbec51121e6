//! 千日手状態（RepetitionState）

use serde::{Deserialize, Serialize};

/// 千日手判定の結果
///
/// 判定は手番側から見た値。`Win`/`Lose` は連続王手の千日手による勝ち/負け。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RepetitionState {
    /// 千日手ではない
    #[default]
    None,
    /// 通常の千日手（引き分け）
    Draw,
    /// 連続王手の千日手で勝ち
    Win,
    /// 連続王手の千日手で負け
    Lose,
    /// 優等局面（盤面同一、手番側の手駒が優位）
    Superior,
    /// 劣等局面（盤面同一、手番側の手駒が劣位）
    Inferior,
}

impl RepetitionState {
    /// 千日手かどうか（通常の千日手または連続王手）
    #[inline]
    pub const fn is_repetition(self) -> bool {
        matches!(self, RepetitionState::Draw | RepetitionState::Win | RepetitionState::Lose)
    }

    /// 勝敗が決まる千日手かどうか
    #[inline]
    pub const fn is_decisive(self) -> bool {
        matches!(self, RepetitionState::Win | RepetitionState::Lose)
    }

    /// 優等/劣等局面かどうか
    #[inline]
    pub const fn is_superior_inferior(self) -> bool {
        matches!(self, RepetitionState::Superior | RepetitionState::Inferior)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repetition_state_predicates() {
        assert!(!RepetitionState::None.is_repetition());
        assert!(RepetitionState::Draw.is_repetition());
        assert!(RepetitionState::Win.is_repetition());
        assert!(RepetitionState::Lose.is_repetition());
        assert!(!RepetitionState::Superior.is_repetition());

        assert!(RepetitionState::Win.is_decisive());
        assert!(RepetitionState::Lose.is_decisive());
        assert!(!RepetitionState::Draw.is_decisive());

        assert!(RepetitionState::Superior.is_superior_inferior());
        assert!(RepetitionState::Inferior.is_superior_inferior());
        assert!(!RepetitionState::Draw.is_superior_inferior());
    }

    #[test]
    fn test_repetition_state_default() {
        assert_eq!(RepetitionState::default(), RepetitionState::None);
    }
}
