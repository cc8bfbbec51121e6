//! Zobristハッシュ乱数テーブル
//!
//! 盤面キー（駒×升、手番）と手駒キーを分離して持つ。盤面キーはXORで、
//! 手駒キーは加算・減算で更新する。手駒は同じ駒が複数枚ありうるので、
//! XORでは2枚目で打ち消されてしまうのに対し、加算なら枚数分だけ値が動く。
//!
//! テーブルはプロセス内で一度だけ固定シードから生成され、以後読み取り専用。

use std::sync::OnceLock;

use rand::RngCore;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::types::{Color, Piece, PieceType, Square};

/// Zobrist乱数テーブル
pub struct Zobrist {
    /// 手番用（後手番のときにXORされる）
    pub side: u64,
    /// 駒×升 [Piece.index()][Square.index()]。Piece::NONEの行は常に0。
    pub psq: [[u64; Square::NUM]; Piece::NUM],
    /// 手駒（加算型）[Color][手駒用PieceType 1..=7]
    pub hand: [[u64; PieceType::HAND_NUM + 1]; Color::NUM],
}

/// テーブル生成用の固定シード
const ZOBRIST_SEED: u64 = 0x7A2B_19E5_03C8_D641;

static ZOBRIST: OnceLock<Zobrist> = OnceLock::new();

fn zobrist() -> &'static Zobrist {
    ZOBRIST.get_or_init(|| {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(ZOBRIST_SEED);
        let mut z = Zobrist {
            side: rng.next_u64(),
            psq: [[0; Square::NUM]; Piece::NUM],
            hand: [[0; PieceType::HAND_NUM + 1]; Color::NUM],
        };
        // pc == 0 (Piece::NONE) の行は0を保つ
        for pc in 1..Piece::NUM {
            for sq in 0..Square::NUM {
                z.psq[pc][sq] = rng.next_u64();
            }
        }
        for c in 0..Color::NUM {
            for pt in 1..=PieceType::HAND_NUM {
                z.hand[c][pt] = rng.next_u64();
            }
        }
        z
    })
}

/// Zobristテーブルを事前構築する（`suzaku_core::init()`から呼ばれる）
pub fn init_zobrist() {
    let _ = zobrist();
}

/// 駒と升のハッシュを取得
#[inline]
pub fn zobrist_psq(pc: Piece, sq: Square) -> u64 {
    zobrist().psq[pc.index()][sq.index()]
}

/// 手駒1枚分のハッシュを取得（加算・減算して使う）
#[inline]
pub fn zobrist_hand(color: Color, pt: PieceType) -> u64 {
    debug_assert!((pt as usize) <= PieceType::HAND_NUM);
    zobrist().hand[color.index()][pt as usize]
}

/// 手番のハッシュを取得
#[inline]
pub fn zobrist_side() -> u64 {
    zobrist().side
}
