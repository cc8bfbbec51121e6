//! 局面状態（StateInfo）
//!
//! do_move時に1手ぶんの派生情報（ハッシュ、王手情報、pin情報、捕獲駒など）を
//! 保存し、undo_move時にはレコードを捨てるだけで全派生情報が巻き戻る。

use crate::bitboard::Bitboard;
use crate::types::{Color, Hand, Move, Piece, PieceType, RepetitionState, Square};

/// 局面状態
///
/// 1手ごとに1レコード。`previous` でひとつ前のレコードに遡れる
/// （ルートのみNone）。レコード本体はPositionが持つスタック上に積まれる。
#[derive(Clone)]
pub struct StateInfo {
    // === do_move時に前レコードから引き継がれる部分 ===
    /// 盤面ハッシュ（手番込み）
    pub board_key: u64,
    /// 手駒ハッシュ（加算型）
    pub hand_key: u64,
    /// 連続王手が何手前から続いているか [Color]
    pub continuous_check: [i32; Color::NUM],
    /// null moveからの手数（千日手の遡り上限に使う）
    pub plies_from_null: i32,

    // === do_move時に再計算される部分 ===
    /// 王手している駒
    pub checkers: Bitboard,
    /// 自玉へのpin駒 [Color]（玉側・敵側どちらの駒も含む）
    pub blockers_for_king: [Bitboard; Color::NUM],
    /// pinしている敵の遠方駒 [Color]
    pub pinners: [Bitboard; Color::NUM],
    /// 駒種ごとに、そこに駒を動かすと敵玉に王手となる升 [PieceType]
    pub check_squares: [Bitboard; PieceType::NUM + 1],
    /// この局面に進むときに捕獲した駒（先後の区別あり）
    pub captured_piece: Piece,
    /// この局面の手番側の手駒スナップショット（千日手判定用）
    pub hand: Hand,
    /// 同一局面が見つかった場合の遡り手数（0 = 見つからず）
    pub repetition: i32,
    /// これまでの同一局面の出現回数 - 1（repetition != 0 のときのみ有効）
    pub repetition_times: i32,
    /// 千日手の種別（このレコードで確定した判定のキャッシュ）
    pub repetition_type: RepetitionState,
    /// 直前の指し手
    pub last_move: Move,
    /// ひとつ前のレコードのインデックス（ルートのみNone）
    pub previous: Option<u32>,
    /// この手で変化した駒の一覧（外部の評価関数が差分更新に使う）
    pub dirty_piece: DirtyPiece,
}

/// 1手で変化した駒の一覧（固定長バッファでヒープ確保を回避）
///
/// 評価関数側がaccumulatorを差分更新するための入力。局面コア自身は
/// この情報を消費しない。
#[derive(Clone, Copy)]
pub struct DirtyPiece {
    /// 変化した駒（最大3つ: 動いた駒 + 取られた駒、打ちでは1つ）
    pieces: [ChangedPiece; Self::MAX_PIECES],
    pieces_len: u8,
    /// 手駒の変化（打ち駒 or 捕獲による変化、最大1つ）
    hand_change: Option<HandChange>,
    /// 玉が動いたかどうか [Color]
    pub king_moved: [bool; Color::NUM],
}

impl DirtyPiece {
    /// piecesの最大要素数
    pub const MAX_PIECES: usize = 3;

    /// 空のDirtyPiece
    #[inline]
    pub const fn new() -> Self {
        Self {
            pieces: [ChangedPiece::EMPTY; Self::MAX_PIECES],
            pieces_len: 0,
            hand_change: None,
            king_moved: [false; Color::NUM],
        }
    }

    /// 情報をクリア
    #[inline]
    pub fn clear(&mut self) {
        self.pieces_len = 0;
        self.hand_change = None;
        self.king_moved = [false; Color::NUM];
    }

    /// 駒変化を追加
    #[inline]
    pub fn push_piece(&mut self, piece: ChangedPiece) {
        debug_assert!((self.pieces_len as usize) < Self::MAX_PIECES);
        self.pieces[self.pieces_len as usize] = piece;
        self.pieces_len += 1;
    }

    /// 手駒変化を記録
    #[inline]
    pub fn set_hand_change(&mut self, change: HandChange) {
        debug_assert!(self.hand_change.is_none());
        self.hand_change = Some(change);
    }

    /// 駒変化のスライスを取得
    #[inline]
    pub fn pieces(&self) -> &[ChangedPiece] {
        &self.pieces[..self.pieces_len as usize]
    }

    /// 手駒変化を取得
    #[inline]
    pub fn hand_change(&self) -> Option<HandChange> {
        self.hand_change
    }
}

impl Default for DirtyPiece {
    fn default() -> Self {
        Self::new()
    }
}

/// 1駒分の変更情報
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChangedPiece {
    /// 変更前の駒（盤上に無ければPiece::NONE）
    pub old_piece: Piece,
    /// 変更前の位置（盤上に無ければNone）
    pub old_sq: Option<Square>,
    /// 変更後の駒（盤上から消えたならPiece::NONE）
    pub new_piece: Piece,
    /// 変更後の位置（盤上から消えたならNone）
    pub new_sq: Option<Square>,
}

impl ChangedPiece {
    /// 空のChangedPiece（固定長配列の初期化用）
    pub const EMPTY: Self = Self {
        old_piece: Piece::NONE,
        old_sq: None,
        new_piece: Piece::NONE,
        new_sq: None,
    };
}

/// 手駒の変化情報
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandChange {
    pub owner: Color,
    pub piece_type: PieceType,
    pub old_count: u8,
    pub new_count: u8,
}

impl StateInfo {
    /// 空の状態を生成（ルート用）
    pub fn new() -> Self {
        StateInfo {
            board_key: 0,
            hand_key: 0,
            continuous_check: [0; Color::NUM],
            plies_from_null: 0,
            checkers: Bitboard::EMPTY,
            blockers_for_king: [Bitboard::EMPTY; Color::NUM],
            pinners: [Bitboard::EMPTY; Color::NUM],
            check_squares: [Bitboard::EMPTY; PieceType::NUM + 1],
            captured_piece: Piece::NONE,
            hand: Hand::EMPTY,
            repetition: 0,
            repetition_times: 0,
            repetition_type: RepetitionState::None,
            last_move: Move::NONE,
            previous: None,
            dirty_piece: DirtyPiece::new(),
        }
    }

    /// 局面のハッシュキー（盤面キーと手駒キーの合成）
    #[inline]
    pub fn key(&self) -> u64 {
        self.board_key.wrapping_add(self.hand_key)
    }

    /// do_move用の引き継ぎコピー。再計算される部分は初期値に戻す。
    pub fn partial_clone(&self) -> Self {
        StateInfo {
            board_key: self.board_key,
            hand_key: self.hand_key,
            continuous_check: self.continuous_check,
            plies_from_null: self.plies_from_null,
            checkers: Bitboard::EMPTY,
            blockers_for_king: [Bitboard::EMPTY; Color::NUM],
            pinners: [Bitboard::EMPTY; Color::NUM],
            check_squares: [Bitboard::EMPTY; PieceType::NUM + 1],
            captured_piece: Piece::NONE,
            hand: Hand::EMPTY,
            repetition: 0,
            repetition_times: 0,
            repetition_type: RepetitionState::None,
            last_move: Move::NONE,
            previous: None,
            dirty_piece: DirtyPiece::new(),
        }
    }
}

impl Default for StateInfo {
    fn default() -> Self {
        Self::new()
    }
}
