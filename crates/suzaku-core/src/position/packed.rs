//! 局面の32バイト固定長パック表現（PackedSfen）
//!
//! 盤面・手駒・手番をハフマン符号で256bitちょうどに詰める。手数は含まない。
//! 教師データの重複排除テーブルのキーとして使うため、等値比較とハッシュを
//! 持つ。壊れたレコードの解凍は型付きエラーとして報告され、パニックしない。
//!
//! 符号設計（LSBから書き込む）:
//! - 1bit: 手番
//! - 7bit x2: 先手玉・後手玉の升
//! - 盤上の各升（玉を除く81-2升）: 空き=0(1bit)、駒=駒種符号+成りbit+先後bit
//! - 手駒: 盤上符号の先頭の空き判別bitを落とした符号+成りbit(常に0)+先後bit
//!
//! 標準の40枚の駒が盤上と手駒に全て存在する局面では合計がちょうど256bitに
//! なる（空き升1bit、歩は盤上4bit/手駒3bit+空き1bit、のように駒の所在に
//! よらず総和が不変になるよう符号長が選ばれている）。駒落ちの局面はこの
//! 性質を満たさないため、パックは標準駒組の局面にのみ使える。

use thiserror::Error;

use crate::types::{Color, PieceType, Square};

use super::pos::Position;
use super::sfen::SfenError;

/// packされた局面（32バイト）
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackedSfen {
    pub data: [u8; 32],
}

impl PackedSfen {
    /// 全ゼロのバッファ
    pub const ZERO: PackedSfen = PackedSfen { data: [0; 32] };

    /// 手番を返す（bit0に格納されている）
    #[inline]
    pub fn color(&self) -> Color {
        if self.data[0] & 1 == 0 {
            Color::Black
        } else {
            Color::White
        }
    }
}

impl std::fmt::Debug for PackedSfen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PackedSfen(")?;
        for b in self.data {
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}

/// PackedSfenの解凍エラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PackedSfenError {
    /// 玉の升が盤外、または両玉が同じ升
    #[error("bad king square")]
    BadKingSquare,
    /// 256bitを超えて読もうとした（符号の途中でデータが尽きた）
    #[error("bit stream overflow")]
    Overflow,
    /// 成れない駒に成りビットが立っている
    #[error("invalid promotion bit")]
    BadPromotionBit,
    /// 駒数が多すぎる（パディングの誤読を含む）
    #[error("too many pieces: {0}")]
    TooManyPieces(&'static str),
    /// 解凍結果が局面として矛盾している
    #[error("inconsistent position: {0}")]
    Inconsistent(SfenError),
}

/// 盤上の駒種符号（生駒種で引く）: (code, bits)
///
/// 符号はLSBから書き込む。先頭bit=0が空き升、以降はプレフィックス符号。
const HUFFMAN_TABLE: [(u8, u8); 8] = [
    (0x00, 1), // 空き升
    (0x01, 2), // 歩
    (0x03, 4), // 香
    (0x0b, 4), // 桂
    (0x07, 4), // 銀
    (0x1f, 6), // 角
    (0x3f, 6), // 飛
    (0x0f, 5), // 金
];

/// LSBファーストのビット書き込み
struct BitWriter {
    data: [u8; 32],
    cursor: usize,
}

impl BitWriter {
    fn new() -> Self {
        BitWriter {
            data: [0; 32],
            cursor: 0,
        }
    }

    fn write_bit(&mut self, bit: bool) {
        debug_assert!(self.cursor < 256);
        if bit {
            self.data[self.cursor >> 3] |= 1 << (self.cursor & 7);
        }
        self.cursor += 1;
    }

    fn write_bits(&mut self, value: u32, bits: u8) {
        for i in 0..bits {
            self.write_bit((value >> i) & 1 != 0);
        }
    }
}

/// LSBファーストのビット読み出し
struct BitReader<'a> {
    data: &'a [u8; 32],
    cursor: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8; 32]) -> Self {
        BitReader { data, cursor: 0 }
    }

    fn read_bit(&mut self) -> Result<bool, PackedSfenError> {
        if self.cursor >= 256 {
            return Err(PackedSfenError::Overflow);
        }
        let bit = (self.data[self.cursor >> 3] >> (self.cursor & 7)) & 1 != 0;
        self.cursor += 1;
        Ok(bit)
    }

    fn read_bits(&mut self, bits: u8) -> Result<u32, PackedSfenError> {
        let mut value = 0u32;
        for i in 0..bits {
            if self.read_bit()? {
                value |= 1 << i;
            }
        }
        Ok(value)
    }
}

/// 盤上の1升を書き込む（空き or 玉以外の駒）
fn write_board_piece(w: &mut BitWriter, pc: crate::types::Piece) {
    if pc.is_none() {
        w.write_bit(false);
        return;
    }
    let pt = pc.piece_type();
    let raw = pt.unpromote();
    let (code, bits) = HUFFMAN_TABLE[raw as usize];
    w.write_bits(code as u32, bits);
    if raw != PieceType::Gold {
        w.write_bit(pt.is_promoted());
    }
    w.write_bit(pc.color() == Color::White);
}

/// 手駒1枚を書き込む（空き判別bitを省略した符号）
fn write_hand_piece(w: &mut BitWriter, color: Color, pt: PieceType) {
    let (code, bits) = HUFFMAN_TABLE[pt as usize];
    w.write_bits((code >> 1) as u32, bits - 1);
    if pt != PieceType::Gold {
        w.write_bit(false);
    }
    w.write_bit(color == Color::White);
}

/// 盤上の1升を読み出す。Noneは空き升。玉は現れない。
fn read_board_piece(
    r: &mut BitReader,
) -> Result<Option<(Color, PieceType)>, PackedSfenError> {
    if !r.read_bit()? {
        return Ok(None);
    }
    // 空きでない: プレフィックス符号の残りをたどる
    // 歩=10, 香=1100, 桂=1101, 銀=1110, 金=11110, 角=111110, 飛=111111
    let raw = if !r.read_bit()? {
        PieceType::Pawn
    } else if !r.read_bit()? {
        if !r.read_bit()? {
            PieceType::Lance
        } else {
            PieceType::Knight
        }
    } else if !r.read_bit()? {
        PieceType::Silver
    } else if !r.read_bit()? {
        PieceType::Gold
    } else if !r.read_bit()? {
        PieceType::Bishop
    } else {
        PieceType::Rook
    };

    let pt = if raw != PieceType::Gold && r.read_bit()? {
        raw.promote().ok_or(PackedSfenError::BadPromotionBit)?
    } else {
        raw
    };
    let color = if r.read_bit()? { Color::White } else { Color::Black };
    Ok(Some((color, pt)))
}

/// 手駒1枚を読み出す
fn read_hand_piece(r: &mut BitReader) -> Result<(Color, PieceType), PackedSfenError> {
    // 歩=0, 香=100, 桂=101, 銀=110, 金=1110, 角=11110, 飛=11111
    let pt = if !r.read_bit()? {
        PieceType::Pawn
    } else if !r.read_bit()? {
        if !r.read_bit()? {
            PieceType::Lance
        } else {
            PieceType::Knight
        }
    } else if !r.read_bit()? {
        PieceType::Silver
    } else if !r.read_bit()? {
        PieceType::Gold
    } else if !r.read_bit()? {
        PieceType::Bishop
    } else {
        PieceType::Rook
    };

    if pt != PieceType::Gold && r.read_bit()? {
        // 手駒に成駒はない
        return Err(PackedSfenError::BadPromotionBit);
    }
    let color = if r.read_bit()? { Color::White } else { Color::Black };
    Ok((color, pt))
}

impl Position {
    /// 現局面をpackする
    ///
    /// 手数は含まれない。標準の40枚の駒が全て存在する局面でのみ、解凍と
    /// 往復可能な256bit表現になる。
    pub fn sfen_pack(&self) -> PackedSfen {
        let mut w = BitWriter::new();

        w.write_bit(self.side_to_move() == Color::White);
        w.write_bits(self.king_square(Color::Black).raw() as u32, 7);
        w.write_bits(self.king_square(Color::White).raw() as u32, 7);

        for sq in Square::all() {
            let pc = self.piece_on(sq);
            if pc.is_some() && pc.piece_type() == PieceType::King {
                continue;
            }
            write_board_piece(&mut w, pc);
        }

        for color in Color::ALL {
            for pt in PieceType::HAND_PIECES {
                let n = self.hand(color).count(pt);
                for _ in 0..n {
                    write_hand_piece(&mut w, color, pt);
                }
            }
        }

        debug_assert!(w.cursor <= 256);
        PackedSfen { data: w.data }
    }

    /// packされた局面を復元する
    ///
    /// game_plyはpackに含まれないため引数で与える（0以下なら1になる）。
    /// 壊れたレコードはエラーとして報告される。
    pub fn set_from_packed_sfen(
        &mut self,
        packed: &PackedSfen,
        game_ply: i32,
    ) -> Result<(), PackedSfenError> {
        let sfen = sfen_unpack_with_ply(packed, game_ply)?;
        self.set_sfen(&sfen).map_err(PackedSfenError::Inconsistent)
    }

    /// packされた局面をSFEN文字列に解凍する（game_ply = 1となる）
    pub fn sfen_unpack(packed: &PackedSfen) -> Result<String, PackedSfenError> {
        sfen_unpack_with_ply(packed, 1)
    }
}

fn sfen_unpack_with_ply(packed: &PackedSfen, game_ply: i32) -> Result<String, PackedSfenError> {
    let mut r = BitReader::new(&packed.data);

    let side = if r.read_bit()? { Color::White } else { Color::Black };

    let b_king = Square::from_u8(r.read_bits(7)? as u8).ok_or(PackedSfenError::BadKingSquare)?;
    let w_king = Square::from_u8(r.read_bits(7)? as u8).ok_or(PackedSfenError::BadKingSquare)?;
    if b_king == w_king {
        return Err(PackedSfenError::BadKingSquare);
    }

    // 盤面の復元
    let mut board: [Option<(Color, PieceType, bool)>; Square::NUM] = [None; Square::NUM];
    board[b_king.index()] = Some((Color::Black, PieceType::King, false));
    board[w_king.index()] = Some((Color::White, PieceType::King, false));
    for sq in Square::all() {
        if board[sq.index()].is_some() {
            continue;
        }
        if let Some((color, pt)) = read_board_piece(&mut r)? {
            board[sq.index()] = Some((color, pt, pt.is_promoted()));
        }
    }

    // 手駒の復元（256bitを使い切るまで）
    let mut hand_counts = [[0u32; 8]; 2];
    let mut total = 0u32;
    while r.cursor < 256 {
        let (color, pt) = read_hand_piece(&mut r)?;
        hand_counts[color.index()][pt as usize] += 1;
        total += 1;
        if total > 38 {
            return Err(PackedSfenError::TooManyPieces("hand"));
        }
    }

    // SFEN文字列に組み立て（駒数の整合性チェックはset_sfen側で行われる）
    let mut sfen = String::new();
    for rank in 0..9usize {
        let mut empty_count = 0;
        for file in (0..9usize).rev() {
            match board[file * 9 + rank] {
                None => empty_count += 1,
                Some((color, pt, promoted)) => {
                    if empty_count > 0 {
                        sfen.push_str(&empty_count.to_string());
                        empty_count = 0;
                    }
                    if promoted {
                        sfen.push('+');
                    }
                    let ch = match pt.unpromote() {
                        PieceType::Pawn => 'P',
                        PieceType::Lance => 'L',
                        PieceType::Knight => 'N',
                        PieceType::Silver => 'S',
                        PieceType::Bishop => 'B',
                        PieceType::Rook => 'R',
                        PieceType::Gold => 'G',
                        PieceType::King => 'K',
                        _ => unreachable!(),
                    };
                    sfen.push(if color == Color::Black {
                        ch
                    } else {
                        ch.to_ascii_lowercase()
                    });
                }
            }
        }
        if empty_count > 0 {
            sfen.push_str(&empty_count.to_string());
        }
        if rank < 8 {
            sfen.push('/');
        }
    }

    sfen.push(' ');
    sfen.push(if side == Color::Black { 'b' } else { 'w' });
    sfen.push(' ');

    let mut hand_str = String::new();
    for color in Color::ALL {
        for pt in [
            PieceType::Rook,
            PieceType::Bishop,
            PieceType::Gold,
            PieceType::Silver,
            PieceType::Knight,
            PieceType::Lance,
            PieceType::Pawn,
        ] {
            let n = hand_counts[color.index()][pt as usize];
            if n > 0 {
                if n > 1 {
                    hand_str.push_str(&n.to_string());
                }
                let ch = match pt {
                    PieceType::Pawn => 'P',
                    PieceType::Lance => 'L',
                    PieceType::Knight => 'N',
                    PieceType::Silver => 'S',
                    PieceType::Bishop => 'B',
                    PieceType::Rook => 'R',
                    PieceType::Gold => 'G',
                    _ => unreachable!(),
                };
                hand_str.push(if color == Color::Black {
                    ch
                } else {
                    ch.to_ascii_lowercase()
                });
            }
        }
    }
    if hand_str.is_empty() {
        sfen.push('-');
    } else {
        sfen.push_str(&hand_str);
    }

    sfen.push(' ');
    let ply = if game_ply > 0 { game_ply } else { 1 };
    sfen.push_str(&ply.to_string());

    Ok(sfen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::SFEN_HIRATE;

    #[test]
    fn test_pack_hirate_is_exactly_256_bits() {
        let mut pos = Position::new();
        pos.set_hirate();
        // 平手は256bitちょうどに詰まる（パディングなし）
        let packed = pos.sfen_pack();
        assert_eq!(packed.color(), Color::Black);

        let unpacked = Position::sfen_unpack(&packed).unwrap();
        assert_eq!(unpacked, SFEN_HIRATE);
    }

    #[test]
    fn test_pack_roundtrip_midgame() {
        // 全40枚が盤上または手駒にある中盤局面
        let sfens = [
            "8l/1l+R2P3/p2pBG1pp/kps1p4/Nn1P2G2/P1P1P2PP/1PS6/1KSG3+r1/LN2+p3L w Sbgn3p 124",
            "lnsgkgsnl/1r5b1/ppppppppp/9/9/9/PPPPPPPPP/1B5R1/LNSGKGSNL w - 42",
        ];
        for sfen in sfens {
            let mut pos = Position::new();
            pos.set_sfen(sfen).unwrap();
            let packed = pos.sfen_pack();

            let mut restored = Position::new();
            restored.set_from_packed_sfen(&packed, 0).unwrap();

            // 盤・手駒・手番が一致（手数はpackに含まれないので1になる）
            assert_eq!(restored.to_sfen_with_ply(-1), pos.to_sfen_with_ply(-1), "sfen={sfen}");
            assert_eq!(restored.game_ply(), 1);
            assert_eq!(restored.board_key(), pos.board_key());
            assert_eq!(restored.hand_key(), pos.hand_key());

            // pack→unpack→packは恒等
            assert_eq!(restored.sfen_pack(), packed);
        }
    }

    #[test]
    fn test_pack_game_ply_from_argument() {
        let mut pos = Position::new();
        pos.set_hirate();
        let packed = pos.sfen_pack();

        let mut restored = Position::new();
        restored.set_from_packed_sfen(&packed, 77).unwrap();
        assert_eq!(restored.game_ply(), 77);
    }

    #[test]
    fn test_packed_as_hash_key() {
        use std::collections::HashSet;

        let mut pos = Position::new();
        pos.set_hirate();
        let p1 = pos.sfen_pack();

        let m = pos.move_from_usi("7g7f").unwrap();
        pos.do_move(m, false);
        let p2 = pos.sfen_pack();
        pos.undo_move(m);
        let p3 = pos.sfen_pack();

        assert_eq!(p1, p3);
        assert_ne!(p1, p2);

        let mut set = HashSet::new();
        set.insert(p1);
        set.insert(p2);
        set.insert(p3);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_unpack_malformed_king_square() {
        // 玉の升に81以上が入っているレコード
        let mut packed = PackedSfen::ZERO;
        // bit1-7 = 黒玉の升: 127を書き込む
        packed.data[0] = 0xFE;
        assert_eq!(
            Position::sfen_unpack(&packed),
            Err(PackedSfenError::BadKingSquare)
        );
    }

    #[test]
    fn test_unpack_same_king_squares() {
        // 両玉が同じ升
        let mut packed = PackedSfen::ZERO;
        // 黒玉=升5（bit1-7）、白玉=升5（bit8-14）
        packed.data[0] = 5 << 1;
        packed.data[1] = 5;
        assert_eq!(
            Position::sfen_unpack(&packed),
            Err(PackedSfenError::BadKingSquare)
        );
    }

    #[test]
    fn test_unpack_garbage_reports_error() {
        // 全bit1のレコード
        let packed = PackedSfen { data: [0xFF; 32] };
        let mut pos = Position::new();
        assert!(pos.set_from_packed_sfen(&packed, 0).is_err());

        // 全bit0のレコード（玉が重なる）もエラー
        assert!(Position::sfen_unpack(&PackedSfen::ZERO).is_err());
    }
}
