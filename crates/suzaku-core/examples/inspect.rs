//! 局面インスペクタ
//!
//! SFENとUSI手順を与えると、局面を進めながら盤面・ハッシュ・王手/pin情報・
//! 千日手分類を表示する。
//!
//! 使用例:
//!   cargo run --example inspect -- "lnsgkgsnl/1r5b1/ppppppppp/9/9/9/PPPPPPPPP/1B5R1/LNSGKGSNL b - 1" 7g7f 3c3d

use anyhow::{bail, Context, Result};

use suzaku_core::position::{EnteringKingRule, Position, SFEN_HIRATE};
use suzaku_core::types::Color;

fn main() -> Result<()> {
    env_logger::init();
    suzaku_core::init();

    let mut args = std::env::args().skip(1);
    let sfen = args.next().unwrap_or_else(|| SFEN_HIRATE.to_string());

    let mut pos = Position::new();
    pos.set_entering_king_rule(EnteringKingRule::Csa27);
    pos.set_sfen(&sfen).with_context(|| format!("parsing sfen '{sfen}'"))?;

    for usi in args {
        let Some(m) = pos.move_from_usi(&usi) else {
            bail!("unparsable move '{usi}'");
        };
        if !pos.pseudo_legal(m) || !pos.legal(m) {
            bail!("illegal move '{usi}' in {}", pos.to_sfen());
        }
        pos.do_move(m, pos.gives_check(m));
    }

    println!("{pos}");
    println!("key:        {:016x}", pos.key());
    println!("in check:   {}", pos.in_check());
    println!(
        "pinned:     black={} white={}",
        pos.pinned_pieces(Color::Black).count(),
        pos.pinned_pieces(Color::White).count()
    );
    println!("repetition: {:?}", pos.repetition_state());
    println!("declaration: {}", pos.declaration_win().to_usi());
    println!("packed:     {:?}", pos.sfen_pack());

    Ok(())
}
