//! 遠方駒（香、角、飛）の利き計算
//!
//! 升ごとにray上の升集合をマスクとして持ち、マスク内の占有パターンを添字にした
//! 利きテーブルを引く。テーブルはプロセス内で一度だけ構築され、以後は読み取り
//! 専用として全探索スレッドから共有される。
//!
//! rayの走査は壁付き升（`WalledSquare`）で行う。盤外に出た瞬間にborrowビットが
//! 立つので、筋・段の境界判定を個別に書く必要がない。

use std::array;
use std::sync::OnceLock;

use crate::types::{Color, Direction, Piece, PieceType, Square};

use super::{king_effect, step_effect, Bitboard};

struct SliderTable {
    rook_masks: [Vec<Square>; Square::NUM],
    rook_attacks: [Vec<Bitboard>; Square::NUM],
    bishop_masks: [Vec<Square>; Square::NUM],
    bishop_attacks: [Vec<Bitboard>; Square::NUM],
    lance_forward: [[Bitboard; Square::NUM]; Color::NUM],
    between: [[Bitboard; Square::NUM]; Square::NUM],
    line: [[Bitboard; Square::NUM]; Square::NUM],
}

static SLIDER_ATTACKS: OnceLock<SliderTable> = OnceLock::new();

fn slider_attacks() -> &'static SliderTable {
    SLIDER_ATTACKS.get_or_init(SliderTable::new)
}

/// 利き・Zobrist等のプロセス共有テーブルを先に構築しておく。
///
/// 探索ワーカーを起動する前に一度呼ぶ。呼ばなくても初回参照時に
/// 構築されるが、hot pathに初期化コストが漏れる。
pub fn init_tables() {
    let _ = slider_attacks();
}

impl SliderTable {
    fn new() -> Self {
        let mut rook_masks: [Vec<Square>; Square::NUM] = array::from_fn(|_| Vec::new());
        let mut rook_attacks: [Vec<Bitboard>; Square::NUM] = array::from_fn(|_| Vec::new());
        let mut bishop_masks: [Vec<Square>; Square::NUM] = array::from_fn(|_| Vec::new());
        let mut bishop_attacks: [Vec<Bitboard>; Square::NUM] = array::from_fn(|_| Vec::new());
        let mut lance_forward = [[Bitboard::EMPTY; Square::NUM]; Color::NUM];
        let mut between = [[Bitboard::EMPTY; Square::NUM]; Square::NUM];
        let mut line = [[Bitboard::EMPTY; Square::NUM]; Square::NUM];

        for sq in Square::all() {
            let idx = sq.index();

            let rook_rays = build_rays(sq, &Direction::ORTHOGONAL);
            let rook_mask = flatten_rays(&rook_rays);
            rook_attacks[idx] = build_attack_table(&rook_rays, &rook_mask);
            rook_masks[idx] = rook_mask;

            let bishop_rays = build_rays(sq, &Direction::DIAGONAL);
            let bishop_mask = flatten_rays(&bishop_rays);
            bishop_attacks[idx] = build_attack_table(&bishop_rays, &bishop_mask);
            bishop_masks[idx] = bishop_mask;
        }

        for color in Color::ALL {
            let forward = if color == Color::Black {
                Direction::Up
            } else {
                Direction::Down
            };
            for sq in Square::all() {
                let mut bb = Bitboard::EMPTY;
                for target in ray(sq, forward) {
                    bb.set(target);
                }
                lance_forward[color.index()][sq.index()] = bb;
            }
        }

        // between/lineテーブル: 8方向のrayから構築
        for sq in Square::all() {
            for dir in Direction::ALL {
                let mut walked = Bitboard::EMPTY;
                for target in ray(sq, dir) {
                    // sqからtargetへの途中升がwalked
                    between[sq.index()][target.index()] = walked;
                    walked.set(target);
                }
            }
            for dir in Direction::ALL {
                // sqを通るdir方向の直線全体（両端を含む）
                let mut bb = Bitboard::from_square(sq);
                for s in ray(sq, dir) {
                    bb.set(s);
                }
                for s in ray(sq, opposite(dir)) {
                    bb.set(s);
                }
                for target in ray(sq, dir) {
                    line[sq.index()][target.index()] = bb;
                }
            }
        }

        SliderTable {
            rook_masks,
            rook_attacks,
            bishop_masks,
            bishop_attacks,
            lance_forward,
            between,
            line,
        }
    }
}

const fn opposite(dir: Direction) -> Direction {
    match dir {
        Direction::RightUp => Direction::LeftDown,
        Direction::Right => Direction::Left,
        Direction::RightDown => Direction::LeftUp,
        Direction::Up => Direction::Down,
        Direction::Down => Direction::Up,
        Direction::LeftUp => Direction::RightDown,
        Direction::Left => Direction::Right,
        Direction::LeftDown => Direction::RightUp,
    }
}

/// sqからdir方向のray上の升を近い順に列挙する
fn ray(sq: Square, dir: Direction) -> Vec<Square> {
    let mut squares = Vec::new();
    let mut ww = sq.to_walled();
    loop {
        ww = ww.step(dir);
        if !ww.is_inside() {
            break;
        }
        squares.push(ww.to_square());
    }
    squares
}

fn build_rays(sq: Square, dirs: &[Direction]) -> Vec<Vec<Square>> {
    dirs.iter().map(|&d| ray(sq, d)).collect()
}

fn flatten_rays(rays: &[Vec<Square>]) -> Vec<Square> {
    rays.iter().flat_map(|v| v.iter().copied()).collect()
}

fn build_attack_table(rays: &[Vec<Square>], mask: &[Square]) -> Vec<Bitboard> {
    debug_assert!(mask.len() < usize::BITS as usize);
    let table_len = 1usize << mask.len();
    let mut table = Vec::with_capacity(table_len);
    for idx in 0..table_len {
        let occupied = occupancy_from_index(idx, mask);
        table.push(attacks_from_rays(rays, occupied));
    }
    table
}

fn occupancy_from_index(index: usize, mask: &[Square]) -> Bitboard {
    let mut bb = Bitboard::EMPTY;
    for (i, sq) in mask.iter().enumerate() {
        if (index >> i) & 1 == 1 {
            bb.set(*sq);
        }
    }
    bb
}

fn occupancy_to_index(occupied: Bitboard, mask: &[Square]) -> usize {
    let mut idx = 0usize;
    for (i, sq) in mask.iter().enumerate() {
        if occupied.contains(*sq) {
            idx |= 1usize << i;
        }
    }
    idx
}

fn attacks_from_rays(rays: &[Vec<Square>], occupied: Bitboard) -> Bitboard {
    let mut result = Bitboard::EMPTY;
    for ray in rays {
        for &target in ray {
            result.set(target);
            if occupied.contains(target) {
                break;
            }
        }
    }
    result
}

/// 香の利きを計算
#[inline]
pub fn lance_effect(color: Color, sq: Square, occupied: Bitboard) -> Bitboard {
    let table = slider_attacks();
    let forward = table.lance_forward[color.index()][sq.index()];
    rook_effect(sq, occupied) & forward
}

/// 角の利きを計算
#[inline]
pub fn bishop_effect(sq: Square, occupied: Bitboard) -> Bitboard {
    let table = slider_attacks();
    let mask = &table.bishop_masks[sq.index()];
    let idx = occupancy_to_index(occupied, mask);
    table.bishop_attacks[sq.index()][idx]
}

/// 飛車の利きを計算
#[inline]
pub fn rook_effect(sq: Square, occupied: Bitboard) -> Bitboard {
    let table = slider_attacks();
    let mask = &table.rook_masks[sq.index()];
    let idx = occupancy_to_index(occupied, mask);
    table.rook_attacks[sq.index()][idx]
}

/// 馬の利きを計算（角の利き + 王の利き）
#[inline]
pub fn horse_effect(sq: Square, occupied: Bitboard) -> Bitboard {
    bishop_effect(sq, occupied) | king_effect(sq)
}

/// 龍の利きを計算（飛車の利き + 王の利き）
#[inline]
pub fn dragon_effect(sq: Square, occupied: Bitboard) -> Bitboard {
    rook_effect(sq, occupied) | king_effect(sq)
}

/// 任意の駒の利きを計算
pub fn piece_effect(pc: Piece, sq: Square, occupied: Bitboard) -> Bitboard {
    debug_assert!(pc.is_some());
    let (c, pt) = (pc.color(), pc.piece_type());
    match pt {
        PieceType::Lance => lance_effect(c, sq, occupied),
        PieceType::Bishop => bishop_effect(sq, occupied),
        PieceType::Rook => rook_effect(sq, occupied),
        PieceType::Horse => horse_effect(sq, occupied),
        PieceType::Dragon => dragon_effect(sq, occupied),
        _ => step_effect(pt, c, sq),
    }
}

/// 2マス間のBitboard（両端を含まない）。直線上にない場合は空。
#[inline]
pub fn between_bb(sq1: Square, sq2: Square) -> Bitboard {
    slider_attacks().between[sq1.index()][sq2.index()]
}

/// 2マスを通る直線上のBitboard（両端を含む）。直線上にない場合は空。
#[inline]
pub fn line_bb(sq1: Square, sq2: Square) -> Bitboard {
    slider_attacks().line[sq1.index()][sq2.index()]
}

/// 3マスが一直線上にあるか（開き王手の判定に使う）
#[inline]
pub fn aligned(sq1: Square, sq2: Square, sq3: Square) -> bool {
    line_bb(sq1, sq2).contains(sq3)
}
