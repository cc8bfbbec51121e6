//! SFEN形式の解析・出力
//!
//! 解析は構文エラー（`Board`/`SideToMove`/`Hand`/`Ply`）と局面としての矛盾
//! （`Inconsistent`: 駒数超過や玉の重複）を区別して報告する。
//! 出力は `parse(serialize(p)) == p` の往復を保証する。手数フィールドは
//! 省略可能（省略時は1）で、負の手数は「出力時に手数を省略する」印として扱う。

use log::trace;
use thiserror::Error;

use crate::types::{Color, File, Hand, Piece, PieceType, Rank, Square};

use super::pos::Position;
use super::zobrist::{zobrist_hand, zobrist_psq, zobrist_side};

/// 平手初期局面のSFEN
pub const SFEN_HIRATE: &str = "lnsgkgsnl/1r5b1/ppppppppp/9/9/9/PPPPPPPPP/1B5R1/LNSGKGSNL b - 1";

/// SFENパースエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SfenError {
    /// 盤面の形式が不正
    #[error("invalid board: {0}")]
    Board(String),
    /// 手番の形式が不正
    #[error("invalid side to move: {0}")]
    SideToMove(String),
    /// 手駒の形式が不正
    #[error("invalid hand: {0}")]
    Hand(String),
    /// 手数の形式が不正
    #[error("invalid ply: {0}")]
    Ply(String),
    /// 構文としては正しいが局面として矛盾している
    #[error("inconsistent position: {0}")]
    Inconsistent(String),
}

/// 駒種ごとの全体の最大枚数（盤上+両手駒）
const PIECE_LIMITS: [(PieceType, u32); 8] = [
    (PieceType::Pawn, 18),
    (PieceType::Lance, 4),
    (PieceType::Knight, 4),
    (PieceType::Silver, 4),
    (PieceType::Gold, 4),
    (PieceType::Bishop, 2),
    (PieceType::Rook, 2),
    (PieceType::King, 2),
];

impl Position {
    /// 平手初期局面を設定
    pub fn set_hirate(&mut self) {
        self.set_sfen(SFEN_HIRATE).unwrap();
    }

    /// SFEN文字列から局面を設定
    ///
    /// 盤面・手駒・手番・手数と全派生情報（ハッシュ、王手、pin）をゼロから
    /// 再計算する。セットアップ専用で、探索中には呼ばれない。
    /// ルール設定（千日手の遡り上限・入玉ルール）は保持される。
    pub fn set_sfen(&mut self, sfen: &str) -> Result<(), SfenError> {
        let max_repetition_ply = self.max_repetition_ply;
        let entering_king_rule = self.entering_king_rule;
        *self = Position::new();
        self.max_repetition_ply = max_repetition_ply;
        self.entering_king_rule = entering_king_rule;

        let parts: Vec<&str> = sfen.split_whitespace().collect();
        if parts.len() < 3 {
            return Err(SfenError::Board("SFEN must have at least 3 parts".to_string()));
        }

        // 1. 盤面
        let kings_found = self.parse_board(parts[0])?;

        // 2. 手番
        match parts[1] {
            "b" => self.side_to_move = Color::Black,
            "w" => self.side_to_move = Color::White,
            _ => {
                return Err(SfenError::SideToMove(format!(
                    "expected 'b' or 'w', got '{}'",
                    parts[1]
                )))
            }
        }

        // 3. 手駒
        self.parse_hand(parts[2])?;

        // 4. 手数（省略時は1、負値は「出力時に省略」の印としてそのまま保持）
        if parts.len() >= 4 {
            self.game_ply = parts[3].parse().map_err(|_| SfenError::Ply(parts[3].to_string()))?;
        } else {
            self.game_ply = 1;
        }

        // 5. 局面としての整合性
        self.validate_counts()?;

        // 6. 派生情報の再計算
        self.compute_hash();
        self.update_blockers_and_pinners();
        self.update_check_squares();

        let us = self.side_to_move;
        let them = !us;
        if kings_found[us.index()] {
            let checkers = self.attackers_to_c(them, self.king_square[us.index()]);
            self.state_mut().checkers = checkers;
        }
        self.state_mut().hand = self.hands[us.index()];

        trace!("set_sfen: key={:016x} stm={:?} ply={}", self.key(), us, self.game_ply);
        Ok(())
    }

    /// 現局面のSFEN文字列を取得
    ///
    /// 保持している手数が負のときは手数フィールドを省略する。
    pub fn to_sfen(&self) -> String {
        self.to_sfen_with_ply(self.game_ply)
    }

    /// 手数フィールドを指定してSFEN文字列を取得（負値なら省略）
    pub fn to_sfen_with_ply(&self, ply: i32) -> String {
        let mut result = String::new();

        // 1. 盤面
        for rank in Rank::ALL {
            let mut empty_count = 0;

            for file in File::ALL.iter().rev() {
                let sq = Square::new(*file, rank);
                let pc = self.piece_on(sq);

                if pc.is_none() {
                    empty_count += 1;
                } else {
                    if empty_count > 0 {
                        result.push_str(&empty_count.to_string());
                        empty_count = 0;
                    }
                    result.push_str(piece_to_sfen(pc));
                }
            }

            if empty_count > 0 {
                result.push_str(&empty_count.to_string());
            }

            if rank != Rank::Rank9 {
                result.push('/');
            }
        }

        // 2. 手番
        result.push(' ');
        result.push(if self.side_to_move == Color::Black { 'b' } else { 'w' });

        // 3. 手駒
        result.push(' ');
        let hand_str = hands_to_sfen(&self.hands);
        if hand_str.is_empty() {
            result.push('-');
        } else {
            result.push_str(&hand_str);
        }

        // 4. 手数
        if ply >= 0 {
            result.push(' ');
            result.push_str(&ply.to_string());
        }

        result
    }

    /// 現局面を先後反転（180度回転＋駒の先後入れ替え）したSFENを取得
    pub fn flipped_sfen(&self) -> String {
        // 往復可能であることが既知の文字列なのでunwrapできる
        sfen_to_flipped_sfen(&self.to_sfen()).unwrap()
    }

    /// SFEN文字列の先後反転（純粋なテキスト変換、局面オブジェクト不要）
    pub fn sfen_to_flipped_sfen(sfen: &str) -> Result<String, SfenError> {
        sfen_to_flipped_sfen(sfen)
    }

    /// 盤面部分をパース。玉を見つけたかどうかを先後別に返す。
    fn parse_board(&mut self, board_str: &str) -> Result<[bool; 2], SfenError> {
        let ranks: Vec<&str> = board_str.split('/').collect();
        if ranks.len() != 9 {
            return Err(SfenError::Board(format!("expected 9 ranks, got {}", ranks.len())));
        }

        let mut kings_found = [false; 2];

        for (rank_idx, rank_str) in ranks.iter().enumerate() {
            let rank = Rank::ALL[rank_idx];
            let mut file_idx = 8i32; // 9筋から開始
            let mut promoted = false;

            for c in rank_str.chars() {
                if c == '+' {
                    if promoted {
                        return Err(SfenError::Board("doubled '+'".to_string()));
                    }
                    promoted = true;
                    continue;
                }

                if let Some(digit) = c.to_digit(10) {
                    if promoted || digit == 0 {
                        return Err(SfenError::Board(format!("bad digit in rank {}", rank_idx + 1)));
                    }
                    file_idx -= digit as i32;
                    if file_idx < -1 {
                        return Err(SfenError::Board(format!(
                            "too many squares in rank {}",
                            rank_idx + 1
                        )));
                    }
                } else {
                    if file_idx < 0 {
                        return Err(SfenError::Board(format!(
                            "too many pieces in rank {}",
                            rank_idx + 1
                        )));
                    }

                    let sq = Square::new(File::ALL[file_idx as usize], rank);
                    let pc = sfen_char_to_piece(c, promoted)?;
                    self.put_piece(pc, sq);

                    if pc.piece_type() == PieceType::King {
                        if kings_found[pc.color().index()] {
                            return Err(SfenError::Inconsistent(format!(
                                "more than one {:?} king",
                                pc.color()
                            )));
                        }
                        kings_found[pc.color().index()] = true;
                        self.king_square[pc.color().index()] = sq;
                    }

                    promoted = false;
                    file_idx -= 1;
                }
            }

            if file_idx != -1 {
                return Err(SfenError::Board(format!(
                    "rank {} has wrong number of squares",
                    rank_idx + 1
                )));
            }
        }

        Ok(kings_found)
    }

    /// 手駒部分をパース
    fn parse_hand(&mut self, hand_str: &str) -> Result<(), SfenError> {
        if hand_str == "-" {
            return Ok(());
        }

        let mut count = 0u32;
        for c in hand_str.chars() {
            if let Some(digit) = c.to_digit(10) {
                count = count * 10 + digit;
                if count > 18 {
                    return Err(SfenError::Hand(format!("count too large: {count}")));
                }
            } else {
                let (color, pt) = sfen_hand_char_to_piece(c)?;
                let actual_count = if count == 0 { 1 } else { count };

                for _ in 0..actual_count {
                    if self.hands[color.index()].count(pt)
                        >= PIECE_LIMITS.iter().find(|(p, _)| *p == pt).unwrap().1
                    {
                        return Err(SfenError::Inconsistent(format!("too many {pt:?} in hand")));
                    }
                    self.hands[color.index()] = self.hands[color.index()].add(pt);
                }
                count = 0;
            }
        }
        if count != 0 {
            return Err(SfenError::Hand("trailing count".to_string()));
        }

        Ok(())
    }

    /// 駒数の整合性チェック（盤上+両手駒が駒種ごとの上限内か）
    fn validate_counts(&self) -> Result<(), SfenError> {
        for (pt, limit) in PIECE_LIMITS {
            let mut total = self.pieces_pt(pt).count();
            // 成駒は生駒として数える
            if let Some(promoted) = pt.promote() {
                total += self.pieces_pt(promoted).count();
            }
            for c in Color::ALL {
                if (pt as usize) <= PieceType::HAND_NUM {
                    total += self.hand(c).count(pt);
                }
            }
            if total > limit {
                return Err(SfenError::Inconsistent(format!(
                    "{total} {pt:?}s on board and in hand (limit {limit})"
                )));
            }
        }
        Ok(())
    }

    /// ハッシュ値をゼロから計算（セットアップ専用）
    fn compute_hash(&mut self) {
        let mut board_key = 0u64;
        let mut hand_key = 0u64;

        for sq in Square::all() {
            let pc = self.piece_on(sq);
            if pc.is_some() {
                board_key ^= zobrist_psq(pc, sq);
            }
        }

        if self.side_to_move == Color::White {
            board_key ^= zobrist_side();
        }

        for color in Color::ALL {
            for pt in PieceType::HAND_PIECES {
                let cnt = self.hand(color).count(pt);
                for _ in 0..cnt {
                    hand_key = hand_key.wrapping_add(zobrist_hand(color, pt));
                }
            }
        }

        let st = self.state_mut();
        st.board_key = board_key;
        st.hand_key = hand_key;
    }
}

/// 駒をSFEN表記に変換
fn piece_to_sfen(pc: Piece) -> &'static str {
    match (pc.color(), pc.piece_type()) {
        (Color::Black, PieceType::Pawn) => "P",
        (Color::Black, PieceType::Lance) => "L",
        (Color::Black, PieceType::Knight) => "N",
        (Color::Black, PieceType::Silver) => "S",
        (Color::Black, PieceType::Bishop) => "B",
        (Color::Black, PieceType::Rook) => "R",
        (Color::Black, PieceType::Gold) => "G",
        (Color::Black, PieceType::King) => "K",
        (Color::Black, PieceType::ProPawn) => "+P",
        (Color::Black, PieceType::ProLance) => "+L",
        (Color::Black, PieceType::ProKnight) => "+N",
        (Color::Black, PieceType::ProSilver) => "+S",
        (Color::Black, PieceType::Horse) => "+B",
        (Color::Black, PieceType::Dragon) => "+R",
        (Color::White, PieceType::Pawn) => "p",
        (Color::White, PieceType::Lance) => "l",
        (Color::White, PieceType::Knight) => "n",
        (Color::White, PieceType::Silver) => "s",
        (Color::White, PieceType::Bishop) => "b",
        (Color::White, PieceType::Rook) => "r",
        (Color::White, PieceType::Gold) => "g",
        (Color::White, PieceType::King) => "k",
        (Color::White, PieceType::ProPawn) => "+p",
        (Color::White, PieceType::ProLance) => "+l",
        (Color::White, PieceType::ProKnight) => "+n",
        (Color::White, PieceType::ProSilver) => "+s",
        (Color::White, PieceType::Horse) => "+b",
        (Color::White, PieceType::Dragon) => "+r",
    }
}

/// 手駒の出力順（先手大文字→後手小文字、それぞれ飛角金銀桂香歩）
const HAND_SFEN_ORDER: [PieceType; 7] = [
    PieceType::Rook,
    PieceType::Bishop,
    PieceType::Gold,
    PieceType::Silver,
    PieceType::Knight,
    PieceType::Lance,
    PieceType::Pawn,
];

fn hands_to_sfen(hands: &[Hand; 2]) -> String {
    let mut result = String::new();
    for color in Color::ALL {
        for pt in HAND_SFEN_ORDER {
            let cnt = hands[color.index()].count(pt);
            if cnt > 0 {
                if cnt > 1 {
                    result.push_str(&cnt.to_string());
                }
                result.push_str(piece_to_sfen(Piece::new(color, pt)));
            }
        }
    }
    result
}

/// SFEN文字を駒に変換
fn sfen_char_to_piece(c: char, promoted: bool) -> Result<Piece, SfenError> {
    let color = if c.is_ascii_uppercase() { Color::Black } else { Color::White };

    let base_pt = match c.to_ascii_uppercase() {
        'P' => PieceType::Pawn,
        'L' => PieceType::Lance,
        'N' => PieceType::Knight,
        'S' => PieceType::Silver,
        'B' => PieceType::Bishop,
        'R' => PieceType::Rook,
        'G' => PieceType::Gold,
        'K' => PieceType::King,
        _ => return Err(SfenError::Board(format!("unknown piece: {c}"))),
    };

    let pt = if promoted {
        base_pt
            .promote()
            .ok_or_else(|| SfenError::Board(format!("cannot promote: {c}")))?
    } else {
        base_pt
    };

    Ok(Piece::new(color, pt))
}

/// SFEN手駒文字を駒種に変換
fn sfen_hand_char_to_piece(c: char) -> Result<(Color, PieceType), SfenError> {
    let color = if c.is_ascii_uppercase() { Color::Black } else { Color::White };

    let pt = match c.to_ascii_uppercase() {
        'P' => PieceType::Pawn,
        'L' => PieceType::Lance,
        'N' => PieceType::Knight,
        'S' => PieceType::Silver,
        'B' => PieceType::Bishop,
        'R' => PieceType::Rook,
        'G' => PieceType::Gold,
        _ => return Err(SfenError::Hand(format!("unknown hand piece: {c}"))),
    };

    Ok((color, pt))
}

/// SFEN文字列を先後反転する純粋なテキスト変換
///
/// 盤面を180度回転し、全駒の先後を入れ替え、手番を反転する。
/// 手数フィールドはそのまま維持される。
fn sfen_to_flipped_sfen(sfen: &str) -> Result<String, SfenError> {
    let parts: Vec<&str> = sfen.split_whitespace().collect();
    if parts.len() < 3 {
        return Err(SfenError::Board("SFEN must have at least 3 parts".to_string()));
    }

    // 盤面を(成りフラグ, 文字)の81マスに展開する
    let ranks: Vec<&str> = parts[0].split('/').collect();
    if ranks.len() != 9 {
        return Err(SfenError::Board(format!("expected 9 ranks, got {}", ranks.len())));
    }

    let mut grid: [[Option<(bool, char)>; 9]; 9] = [[None; 9]; 9];
    for (r, rank_str) in ranks.iter().enumerate() {
        let mut c_idx = 0usize; // 左端 = 9筋
        let mut promoted = false;
        for ch in rank_str.chars() {
            if ch == '+' {
                promoted = true;
                continue;
            }
            if let Some(digit) = ch.to_digit(10) {
                c_idx += digit as usize;
            } else {
                if c_idx >= 9 {
                    return Err(SfenError::Board(format!("too many pieces in rank {}", r + 1)));
                }
                grid[r][c_idx] = Some((promoted, ch));
                promoted = false;
                c_idx += 1;
            }
            if c_idx > 9 {
                return Err(SfenError::Board(format!("too many squares in rank {}", r + 1)));
            }
        }
        if c_idx != 9 {
            return Err(SfenError::Board(format!("rank {} has wrong number of squares", r + 1)));
        }
    }

    // 180度回転＋大文字小文字の入れ替え
    let mut board = String::new();
    for r in 0..9 {
        let mut empty_count = 0;
        for c in 0..9 {
            match grid[8 - r][8 - c] {
                None => empty_count += 1,
                Some((promoted, ch)) => {
                    if empty_count > 0 {
                        board.push_str(&empty_count.to_string());
                        empty_count = 0;
                    }
                    if promoted {
                        board.push('+');
                    }
                    board.push(flip_case(ch));
                }
            }
        }
        if empty_count > 0 {
            board.push_str(&empty_count.to_string());
        }
        if r < 8 {
            board.push('/');
        }
    }

    // 手番の反転
    let side = match parts[1] {
        "b" => "w",
        "w" => "b",
        s => return Err(SfenError::SideToMove(s.to_string())),
    };

    // 手駒は枚数を読み取って先後を入れ替え、正規の順序で再出力
    let mut hands = [Hand::EMPTY; 2];
    if parts[2] != "-" {
        let mut count = 0u32;
        for ch in parts[2].chars() {
            if let Some(digit) = ch.to_digit(10) {
                count = count * 10 + digit;
            } else {
                let (color, pt) = sfen_hand_char_to_piece(ch)?;
                let flipped = !color;
                let actual = if count == 0 { 1 } else { count };
                hands[flipped.index()] = hands[flipped.index()]
                    .set(pt, hands[flipped.index()].count(pt) + actual);
                count = 0;
            }
        }
    }
    let hand_str = hands_to_sfen(&hands);

    let mut result = format!(
        "{board} {side} {}",
        if hand_str.is_empty() { "-".to_string() } else { hand_str }
    );
    if let Some(ply) = parts.get(3) {
        result.push(' ');
        result.push_str(ply);
    }
    Ok(result)
}

const fn flip_case(c: char) -> char {
    if c.is_ascii_uppercase() {
        c.to_ascii_lowercase()
    } else {
        c.to_ascii_uppercase()
    }
}
