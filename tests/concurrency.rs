use std::sync::Arc;
use std::thread;

use wager_eng::draw::ScriptedDraws;
use wager_eng::model::GameCategory;
use wager_eng::{Amount, Caller, CoreError, Engine, Role};

fn amount(minor: i64) -> Amount {
    Amount::from_minor(minor)
}

fn player(engine: &Engine, balance: i64) -> Caller {
    let account = engine.open_account(Role::Player).unwrap();
    let caller = Caller::player(account.id);
    engine.deposit(caller, amount(balance)).unwrap();
    caller
}

fn assert_invariant(engine: &Engine) {
    for audit in engine.audit_all().unwrap() {
        assert!(audit.is_consistent(), "account {} drifted", audit.account);
        assert!(!audit.balance.is_negative());
    }
}

#[test]
fn concurrent_withdrawals_never_overdraw() {
    let engine = Arc::new(Engine::new());
    let caller = player(&engine, 1_000);

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.withdraw(caller, amount(100)))
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let overdrawn = results
        .iter()
        .filter(|r| matches!(r, Err(CoreError::InsufficientFunds { .. })))
        .count();

    assert_eq!(succeeded, 10);
    assert_eq!(overdrawn, 10);
    assert_eq!(
        engine.account(caller, caller.account).unwrap().balance,
        Amount::ZERO
    );
    assert_invariant(&engine);
}

#[test]
fn concurrent_transfers_conserve_money() {
    let engine = Arc::new(Engine::new());
    let players: Vec<_> = (0..4).map(|_| player(&engine, 500)).collect();

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let engine = Arc::clone(&engine);
            let players = players.clone();
            thread::spawn(move || {
                for round in 0..50 {
                    let from = players[(worker + round) % players.len()];
                    let to = players[(worker + round + 1) % players.len()];
                    let _ = engine.transfer(from, to.account, amount(37));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let total = Amount::checked_sum(
        players
            .iter()
            .map(|p| engine.account(*p, p.account).unwrap().balance),
    );
    assert_eq!(total, Some(amount(2_000)));
    assert_invariant(&engine);
}

#[test]
fn settlement_races_with_bets_and_pays_once() {
    let engine = Arc::new(Engine::new());
    let admin = Caller::admin(engine.open_account(Role::Administrator).unwrap().id);
    let event = engine.create_event(admin, "derby").unwrap().id;
    let outcome = engine
        .add_outcome(admin, event, "favourite", "2.0".parse().unwrap())
        .unwrap()
        .id;
    let bettors: Vec<_> = (0..6).map(|_| player(&engine, 300)).collect();

    let mut handles: Vec<_> = bettors
        .iter()
        .map(|&bettor| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for _ in 0..3 {
                    let _ = engine.place_bet(bettor, event, outcome, amount(100));
                }
            })
        })
        .collect();
    for _ in 0..2 {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            let _ = engine.settle(admin, event, outcome);
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // a bet either landed before settlement and doubled, or was refused
    for bettor in &bettors {
        let balance = engine.account(*bettor, bettor.account).unwrap().balance;
        assert!(balance >= amount(300), "bettor {} lost money", bettor.account);
    }
    assert!(matches!(
        engine.settle(admin, event, outcome),
        Err(CoreError::InvalidState(_))
    ));
    assert_invariant(&engine);
}

#[test]
fn mixed_workload_keeps_every_ledger_balanced() {
    let engine = Arc::new(Engine::new());
    let admin = Caller::admin(engine.open_account(Role::Administrator).unwrap().id);
    let dice = engine
        .create_game(admin, "dice", GameCategory::Dice, amount(1), amount(100))
        .unwrap()
        .id;
    let players: Vec<_> = (0..5).map(|_| player(&engine, 1_000)).collect();

    let handles: Vec<_> = players
        .iter()
        .enumerate()
        .map(|(i, &me)| {
            let engine = Arc::clone(&engine);
            let other = players[(i + 1) % players.len()];
            thread::spawn(move || {
                let mut draws = ScriptedDraws::new((0..36).collect());
                for round in 0..60 {
                    let _ = match round % 4 {
                        0 => engine.play(me, dice, amount(40), &mut draws).map(|_| ()),
                        1 => engine.transfer(me, other.account, amount(15)).map(|_| ()),
                        2 => engine.withdraw(me, amount(25)).map(|_| ()),
                        _ => engine.deposit(me, amount(10)).map(|_| ()),
                    };
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_invariant(&engine);
}
