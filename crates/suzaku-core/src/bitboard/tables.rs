//! 近接駒の利きテーブルとマスク類
//!
//! すべてconst fnでコンパイル時に構築し、static読み取り専用データとして共有する。

use crate::types::{Color, File, PieceType, Rank, Square};

use super::Bitboard;

/// 筋のBitboard
pub static FILE_BB: [Bitboard; File::NUM] = init_file_bb();

/// 段のBitboard
pub static RANK_BB: [Bitboard; Rank::NUM] = init_rank_bb();

/// 敵陣（1-3段/7-9段）のBitboard [Color]
pub static PROMOTION_ZONE_BB: [Bitboard; Color::NUM] = init_promotion_zone_bb();

/// 歩の利き [Color][Square]
pub static PAWN_EFFECT: [[Bitboard; Square::NUM]; Color::NUM] =
    [init_step_effect(&BLACK_PAWN_STEPS), init_step_effect(&WHITE_PAWN_STEPS)];

/// 桂の利き [Color][Square]
pub static KNIGHT_EFFECT: [[Bitboard; Square::NUM]; Color::NUM] =
    [init_step_effect(&BLACK_KNIGHT_STEPS), init_step_effect(&WHITE_KNIGHT_STEPS)];

/// 銀の利き [Color][Square]
pub static SILVER_EFFECT: [[Bitboard; Square::NUM]; Color::NUM] =
    [init_step_effect(&BLACK_SILVER_STEPS), init_step_effect(&WHITE_SILVER_STEPS)];

/// 金の利き [Color][Square]
pub static GOLD_EFFECT: [[Bitboard; Square::NUM]; Color::NUM] =
    [init_step_effect(&BLACK_GOLD_STEPS), init_step_effect(&WHITE_GOLD_STEPS)];

/// 王の利き [Square]
pub static KING_EFFECT: [Bitboard; Square::NUM] = init_step_effect(&KING_STEPS);

// === 1歩の差分リスト (df, dr)。先手視点で前 = rank-1。後手は180度回転。 ===

const BLACK_PAWN_STEPS: [(i32, i32); 1] = [(0, -1)];
const WHITE_PAWN_STEPS: [(i32, i32); 1] = [(0, 1)];
const BLACK_KNIGHT_STEPS: [(i32, i32); 2] = [(1, -2), (-1, -2)];
const WHITE_KNIGHT_STEPS: [(i32, i32); 2] = [(1, 2), (-1, 2)];
const BLACK_SILVER_STEPS: [(i32, i32); 5] = [(0, -1), (1, -1), (-1, -1), (1, 1), (-1, 1)];
const WHITE_SILVER_STEPS: [(i32, i32); 5] = [(0, 1), (1, 1), (-1, 1), (1, -1), (-1, -1)];
const BLACK_GOLD_STEPS: [(i32, i32); 6] =
    [(0, -1), (1, -1), (-1, -1), (1, 0), (-1, 0), (0, 1)];
const WHITE_GOLD_STEPS: [(i32, i32); 6] =
    [(0, 1), (1, 1), (-1, 1), (1, 0), (-1, 0), (0, -1)];
const KING_STEPS: [(i32, i32); 8] = [
    (0, -1),
    (0, 1),
    (1, 0),
    (-1, 0),
    (1, -1),
    (-1, -1),
    (1, 1),
    (-1, 1),
];

// === 初期化関数 ===

const fn square_bb_const(sq: usize) -> Bitboard {
    if sq < 63 {
        Bitboard::new(1u64 << sq, 0)
    } else {
        Bitboard::new(0, 1u64 << (sq - 63))
    }
}

const fn bb_or_const(a: Bitboard, b: Bitboard) -> Bitboard {
    Bitboard::new(a.p0() | b.p0(), a.p1() | b.p1())
}

const fn init_step_effect<const N: usize>(steps: &[(i32, i32); N]) -> [Bitboard; Square::NUM] {
    let mut result = [Bitboard::EMPTY; Square::NUM];
    let mut sq = 0;
    while sq < 81 {
        let file = (sq / 9) as i32;
        let rank = (sq % 9) as i32;
        let mut i = 0;
        while i < N {
            let (df, dr) = steps[i];
            let (f, r) = (file + df, rank + dr);
            if f >= 0 && f <= 8 && r >= 0 && r <= 8 {
                result[sq] = bb_or_const(result[sq], square_bb_const((f * 9 + r) as usize));
            }
            i += 1;
        }
        sq += 1;
    }
    result
}

const fn init_file_bb() -> [Bitboard; File::NUM] {
    let mut result = [Bitboard::EMPTY; File::NUM];
    let mut file = 0;
    while file < 9 {
        let mut rank = 0;
        while rank < 9 {
            result[file] = bb_or_const(result[file], square_bb_const(file * 9 + rank));
            rank += 1;
        }
        file += 1;
    }
    result
}

const fn init_rank_bb() -> [Bitboard; Rank::NUM] {
    let mut result = [Bitboard::EMPTY; Rank::NUM];
    let mut rank = 0;
    while rank < 9 {
        let mut file = 0;
        while file < 9 {
            result[rank] = bb_or_const(result[rank], square_bb_const(file * 9 + rank));
            file += 1;
        }
        rank += 1;
    }
    result
}

const fn init_promotion_zone_bb() -> [Bitboard; Color::NUM] {
    let ranks = init_rank_bb();
    [
        bb_or_const(bb_or_const(ranks[0], ranks[1]), ranks[2]),
        bb_or_const(bb_or_const(ranks[6], ranks[7]), ranks[8]),
    ]
}

// === 利き取得関数 ===

/// 歩の利きを取得
#[inline]
pub fn pawn_effect(color: Color, sq: Square) -> Bitboard {
    PAWN_EFFECT[color.index()][sq.index()]
}

/// 桂の利きを取得
#[inline]
pub fn knight_effect(color: Color, sq: Square) -> Bitboard {
    KNIGHT_EFFECT[color.index()][sq.index()]
}

/// 銀の利きを取得
#[inline]
pub fn silver_effect(color: Color, sq: Square) -> Bitboard {
    SILVER_EFFECT[color.index()][sq.index()]
}

/// 金の利きを取得（成駒の利きにも使う）
#[inline]
pub fn gold_effect(color: Color, sq: Square) -> Bitboard {
    GOLD_EFFECT[color.index()][sq.index()]
}

/// 王の利きを取得
#[inline]
pub fn king_effect(sq: Square) -> Bitboard {
    KING_EFFECT[sq.index()]
}

/// 駒種に応じた近接利きを取得
///
/// 遠方駒（香角飛馬龍）の遠方成分は含まない。占有を見る利きは
/// `piece_effect()`（sliders側）を使う。
#[inline]
pub fn step_effect(pt: PieceType, color: Color, sq: Square) -> Bitboard {
    match pt {
        PieceType::Pawn => pawn_effect(color, sq),
        PieceType::Knight => knight_effect(color, sq),
        PieceType::Silver => silver_effect(color, sq),
        PieceType::Gold
        | PieceType::ProPawn
        | PieceType::ProLance
        | PieceType::ProKnight
        | PieceType::ProSilver => gold_effect(color, sq),
        PieceType::King => king_effect(sq),
        _ => Bitboard::EMPTY,
    }
}
