use super::*;
use crate::mocks::{create_casino, funded_account, FlakyStore, RecordingNotifier};
use proptest::prelude::*;
use raspa_types::api::WithdrawalStatus;
use raspa_types::casino::{
    AccountId, AffiliateId, BalanceSnapshot, LedgerKind, Money, PrizeKind, Tier, HOOK_AMOUNT,
    RECOVERY_MAX, RECOVERY_THRESHOLD, UNLOCK_OFFERS,
};
use rand::{rngs::StdRng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

fn one() -> Money {
    Money::from_units(1)
}

#[tokio::test]
async fn test_fourth_play_is_hook_win() {
    let (casino, store, _) = create_casino(CasinoConfig::default());
    store.put(funded_account(1, Money::from_units(10))).unwrap();
    let mut rng = StdRng::seed_from_u64(1);

    for expected_plays in 1..=3 {
        let outcome = casino
            .play_game_with_rng(AccountId(1), one(), &mut rng)
            .await
            .unwrap();
        assert!(!outcome.is_winner());
        assert_eq!(outcome.total_plays, expected_plays);
        assert_eq!(outcome.loss_streak as u64, expected_plays);
    }

    let hook = casino
        .play_game_with_rng(AccountId(1), one(), &mut rng)
        .await
        .unwrap();
    let prize = hook.decision.prize().expect("hook win");
    assert_eq!(prize.kind, PrizeKind::Hook);
    assert!(hook.grid.has_winning_line());
    assert_eq!(hook.balances.bonus_vault_balance, HOOK_AMOUNT);
    assert_eq!(hook.balances.real_balance, Money::from_units(6));
    assert_eq!(hook.loss_streak, 0);
    assert_eq!(hook.total_plays, 4);
}

#[tokio::test]
async fn test_recovery_after_four_losses() {
    let (casino, store, _) = create_casino(CasinoConfig::default());
    let mut account = funded_account(1, Money::from_units(10));
    account.play.total_plays = 12;
    account.play.loss_streak = RECOVERY_THRESHOLD - 1;
    account.balances.bonus_vault = HOOK_AMOUNT;
    store.put(account).unwrap();

    let outcome = casino
        .play_game_with_rng(AccountId(1), one(), &mut StdRng::seed_from_u64(2))
        .await
        .unwrap();
    let prize = outcome.decision.prize().expect("recovery win");
    assert_eq!(prize.kind, PrizeKind::Recovery);
    assert!(prize.amount >= one() && prize.amount <= Money::from_units(RECOVERY_MAX));
    assert_eq!(outcome.loss_streak, 0);
    assert_eq!(
        outcome.balances.bonus_vault_balance,
        HOOK_AMOUNT.checked_add(prize.amount).unwrap()
    );
}

#[tokio::test]
async fn test_insufficient_balance_leaves_account_untouched() {
    let (casino, store, notifier) = create_casino(CasinoConfig::default());
    store.put(funded_account(1, Money::from_units(10))).unwrap();
    let before = store.load(AccountId(1)).unwrap();

    let err = casino
        .play_game(AccountId(1), Money::from_units(50))
        .await
        .unwrap_err();
    assert!(matches!(err, PlayError::InsufficientBalance { .. }));
    assert_eq!(store.load(AccountId(1)).unwrap(), before);
    assert!(store.ledger(AccountId(1)).unwrap().is_empty());
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn test_unknown_account_and_zero_stake() {
    let (casino, _, _) = create_casino(CasinoConfig::default());
    assert!(matches!(
        casino.play_game(AccountId(404), one()).await,
        Err(PlayError::AccountNotFound(AccountId(404)))
    ));
    assert!(matches!(
        casino.play_game(AccountId(404), Money::ZERO).await,
        Err(PlayError::InvalidStake(_))
    ));
    assert_eq!(casino.locks().active(), 0);
}

#[tokio::test]
async fn test_busy_account_times_out_cleanly() {
    let config = CasinoConfig {
        lock_timeout: Duration::from_millis(25),
        ..CasinoConfig::default()
    };
    let (casino, store, _) = create_casino(config);
    store.put(funded_account(1, Money::from_units(10))).unwrap();
    let before = store.load(AccountId(1)).unwrap();

    let held = casino.locks().acquire(AccountId(1)).await.unwrap();
    assert!(matches!(
        casino.play_game(AccountId(1), one()).await,
        Err(PlayError::AccountBusy(AccountId(1)))
    ));
    assert!(matches!(
        casino.credit_deposit(AccountId(1), one()).await,
        Err(DepositError::AccountBusy(AccountId(1)))
    ));
    drop(held);

    assert_eq!(store.load(AccountId(1)).unwrap(), before);
    casino.play_game(AccountId(1), one()).await.unwrap();
}

#[tokio::test]
async fn test_failed_commit_rolls_back() {
    let store = Arc::new(FlakyStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let casino = Casino::with_notifier(store.clone(), CasinoConfig::default(), notifier.clone());
    store.put(funded_account(1, Money::from_units(10))).unwrap();
    let before = store.load(AccountId(1)).unwrap();

    store.fail_commits(true);
    assert!(matches!(
        casino.play_game(AccountId(1), one()).await,
        Err(PlayError::Persistence(_))
    ));
    assert!(matches!(
        casino.credit_deposit(AccountId(1), one()).await,
        Err(DepositError::Persistence(_))
    ));
    assert_eq!(store.load(AccountId(1)).unwrap(), before);
    assert!(store.ledger(AccountId(1)).unwrap().is_empty());
    assert!(notifier.sent().is_empty());

    store.fail_commits(false);
    let outcome = casino.play_game(AccountId(1), one()).await.unwrap();
    assert_eq!(outcome.total_plays, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_plays_serialize() {
    let (casino, store, notifier) = create_casino(CasinoConfig::default());
    let casino = Arc::new(casino);
    let plays = 64u64;
    store.put(funded_account(1, Money::from_units(plays))).unwrap();

    let mut handles = Vec::new();
    for _ in 0..plays {
        let casino = casino.clone();
        handles.push(tokio::spawn(async move {
            casino.play_game(AccountId(1), one()).await
        }));
    }
    let mut seen_plays = Vec::new();
    for handle in handles {
        seen_plays.push(handle.await.unwrap().unwrap().total_plays);
    }

    seen_plays.sort_unstable();
    assert_eq!(seen_plays, (1..=plays).collect::<Vec<_>>());
    let account = store.load(AccountId(1)).unwrap().unwrap();
    assert_eq!(account.play.total_plays, plays);
    assert_eq!(account.balances.real, Money::ZERO);
    assert_eq!(account.rollover.total_wagered, Money::from_units(plays));
    assert_eq!(notifier.sent().len(), plays as usize);
    assert_eq!(casino.locks().active(), 0);

    let ledger = store.ledger(AccountId(1)).unwrap();
    let bets = ledger.iter().filter(|e| e.kind == LedgerKind::GameBet).count();
    let wins: u64 = ledger
        .iter()
        .filter(|e| e.kind == LedgerKind::GameWin)
        .map(|e| e.amount.cents())
        .sum();
    assert_eq!(bets as u64, plays);
    assert_eq!(wins, account.balances.bonus_vault.cents());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_accounts_are_independent() {
    let (casino, store, _) = create_casino(CasinoConfig::default());
    let casino = Arc::new(casino);
    for id in 1..=8 {
        store.put(funded_account(id, Money::from_units(5))).unwrap();
    }

    let mut handles = Vec::new();
    for id in 1..=8u64 {
        for _ in 0..5 {
            let casino = casino.clone();
            handles.push(tokio::spawn(async move {
                casino.play_game(AccountId(id), one()).await
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    for id in 1..=8 {
        let account = store.load(AccountId(id)).unwrap().unwrap();
        assert_eq!(account.play.total_plays, 5);
        assert_eq!(account.balances.real, Money::ZERO);
    }
}

#[tokio::test]
async fn test_long_session_bounds_streak_and_hooks_once() {
    let (casino, store, _) = create_casino(CasinoConfig::default());
    store.put(funded_account(1, Money::from_units(500))).unwrap();
    let mut rng = StdRng::seed_from_u64(9);

    let mut hooks = 0;
    let mut hook_play = None;
    let mut losses_in_row = 0;
    for _ in 0..500 {
        let outcome = casino
            .play_game_with_rng(AccountId(1), one(), &mut rng)
            .await
            .unwrap();
        if outcome.is_winner() {
            losses_in_row = 0;
        } else {
            losses_in_row += 1;
        }
        assert!(losses_in_row < RECOVERY_THRESHOLD);
        if outcome.decision.prize().map(|p| p.kind) == Some(PrizeKind::Hook) {
            hooks += 1;
            hook_play = Some(outcome.total_plays);
        }
    }
    assert_eq!(hooks, 1);
    assert_eq!(hook_play, Some(4));
    assert_eq!(store.load(AccountId(1)).unwrap().unwrap().balances.real, Money::ZERO);
}

#[tokio::test]
async fn test_deposit_unlock_and_withdraw_flow() {
    let config = CasinoConfig {
        starting_balance: Money::from_units(100),
        ..CasinoConfig::default()
    };
    let (casino, _, notifier) = create_casino(config);
    let account = casino.create_account().await.unwrap();
    let id = account.id;

    let first = casino.credit_deposit(id, Money::from_units(30)).await.unwrap();
    assert!(first.first_deposit);
    assert_eq!(first.tier, Tier::Standard);

    // Four plays: three losses then the hook into the vault.
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..4 {
        casino
            .play_game_with_rng(id, Money::from_units(5), &mut rng)
            .await
            .unwrap();
    }
    assert_eq!(
        casino.request_withdrawal(id).await.unwrap(),
        WithdrawalStatus::UnlockVaultPrompt {
            vault_balance: HOOK_AMOUNT,
            offers: UNLOCK_OFFERS.to_vec(),
        }
    );

    let second = casino.credit_deposit(id, Money::from_units(30)).await.unwrap();
    assert_eq!(second.unlocked, Money::from_units(10));
    assert_eq!(second.balances.real_balance, Money::from_units(150));
    assert_eq!(second.balances.bonus_vault_balance, Money::from_units(90));

    // Rollover target is 2x the last deposit.
    for _ in 0..12 {
        casino
            .play_game_with_rng(id, Money::from_units(5), &mut rng)
            .await
            .unwrap();
    }
    let account = casino.account(id).await.unwrap().unwrap();
    assert_eq!(account.rollover.deposit, Money::from_units(60));
    let status = casino.request_withdrawal(id).await.unwrap();
    assert_eq!(
        status,
        WithdrawalStatus::ReadyToWithdraw {
            amount: account.balances.real
        }
    );

    let after = casino.withdraw(id, account.balances.real).await.unwrap();
    assert_eq!(after.real_balance, Money::ZERO);
    assert_eq!(after.withdrawable_balance, Money::ZERO);
    assert!(matches!(
        casino.withdraw(id, one()).await,
        Err(DepositError::InsufficientWithdrawable { .. })
    ));

    let kinds: Vec<_> = casino.ledger(id).await.unwrap().iter().map(|e| e.kind).collect();
    assert!(kinds.contains(&LedgerKind::VaultUnlock));
    assert_eq!(kinds.last(), Some(&LedgerKind::Withdrawal));
    assert!(notifier.sent().iter().all(|(account, _)| *account == id));
}

#[tokio::test]
async fn test_sqlite_backed_casino() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("raspa.db");
    let id = {
        let casino = Casino::new(SqliteStore::open(&path).unwrap(), CasinoConfig::default());
        let account = casino.create_account().await.unwrap();
        casino.credit_deposit(account.id, Money::from_units(10)).await.unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..4 {
            casino
                .play_game_with_rng(account.id, Money::from_cents(250), &mut rng)
                .await
                .unwrap();
        }
        account.id
    };

    let store = SqliteStore::open(&path).unwrap();
    let account = store.load(id).unwrap().unwrap();
    assert_eq!(account.play.total_plays, 4);
    assert_eq!(account.balances.real, Money::ZERO);
    assert_eq!(account.balances.bonus_vault, HOOK_AMOUNT);
    let ledger = store.ledger(id).unwrap();
    assert_eq!(ledger.len(), 1 + 4 + 1);
}

/// Stalls on its first notification, the way a slow push channel would.
#[derive(Default)]
struct StallingNotifier {
    stalled: AtomicBool,
    order: Mutex<Vec<u64>>,
}

impl Notifier for StallingNotifier {
    fn notify(&self, _account: AccountId, balances: BalanceSnapshot) {
        if !self.stalled.swap(true, Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(300));
        }
        if let Ok(mut order) = self.order.lock() {
            order.push(balances.real_balance.cents());
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_notifications_follow_commit_order() {
    let store = Arc::new(Memory::new());
    let notifier = Arc::new(StallingNotifier::default());
    let casino = Arc::new(Casino::with_notifier(
        store.clone(),
        CasinoConfig::default(),
        notifier.clone(),
    ));
    store.put(funded_account(1, Money::from_units(10))).unwrap();

    let first = {
        let casino = casino.clone();
        tokio::spawn(async move { casino.play_game(AccountId(1), one()).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = {
        let casino = casino.clone();
        tokio::spawn(async move { casino.play_game(AccountId(1), one()).await })
    };
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    let committed = store.load(AccountId(1)).unwrap().unwrap().balances.real;
    assert_eq!(committed, Money::from_units(8));
    let order = notifier.order.lock().unwrap().clone();
    assert_eq!(order, vec![900, 800]);
}

#[tokio::test]
async fn test_coupon_credits_once_and_persists() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::open(&dir.path().join("raspa.db")).unwrap());
    let notifier = Arc::new(RecordingNotifier::default());
    let casino = Casino::with_notifier(store.clone(), CasinoConfig::default(), notifier.clone());
    let partner = store
        .create_affiliate("Partner", "PARTNER10", Money::from_units(10))
        .unwrap();
    let account = casino.create_account().await.unwrap();

    assert!(matches!(
        casino.apply_coupon(account.id, "UNKNOWN").await,
        Err(DepositError::InvalidCoupon(_))
    ));
    let receipt = casino.apply_coupon(account.id, "PARTNER10").await.unwrap();
    assert_eq!(receipt.affiliate, partner);
    assert_eq!(receipt.balances.real_balance, Money::from_units(10));
    assert!(matches!(
        casino.apply_coupon(account.id, "PARTNER10").await,
        Err(DepositError::AlreadyAffiliated(AffiliateId(1)))
    ));

    let stored = store.load(account.id).unwrap().unwrap();
    assert_eq!(stored.affiliate, Some(partner.id));
    assert_eq!(stored.balances.real, Money::from_units(10));
    let ledger = store.ledger(account.id).unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].kind, LedgerKind::AffiliateBonus);
    assert_eq!(notifier.sent().len(), 1);
    assert!(matches!(
        casino.apply_coupon(AccountId(404), "PARTNER10").await,
        Err(DepositError::AccountNotFound(AccountId(404)))
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_play_sequence_conserves_real_balance(
        stakes in prop::collection::vec(1u64..500, 1..40),
        seed in any::<u64>(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let (casino, store, _) = create_casino(CasinoConfig::default());
            let budget: u64 = stakes.iter().sum::<u64>() / 2;
            store.put(funded_account(1, Money::from_cents(budget))).unwrap();
            let mut rng = StdRng::seed_from_u64(seed);

            for stake in stakes {
                let before = store.load(AccountId(1)).unwrap().unwrap();
                let result = casino
                    .play_game_with_rng(AccountId(1), Money::from_cents(stake), &mut rng)
                    .await;
                let after = store.load(AccountId(1)).unwrap().unwrap();
                match result {
                    Ok(outcome) => {
                        prop_assert_eq!(after.balances.real.cents(), before.balances.real.cents() - stake);
                        prop_assert_eq!(after.play.total_plays, before.play.total_plays + 1);
                        prop_assert_eq!(outcome.balances, after.snapshot());
                        let expected_streak = if outcome.is_winner() { 0 } else { before.play.loss_streak + 1 };
                        prop_assert_eq!(after.play.loss_streak, expected_streak);
                    }
                    Err(PlayError::InsufficientBalance { .. }) => {
                        prop_assert!(stake > before.balances.real.cents());
                        prop_assert_eq!(&after, &before);
                    }
                    Err(other) => prop_assert!(false, "unexpected error {other}"),
                }
            }
            Ok(())
        })?;
    }
}
