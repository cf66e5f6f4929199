//! Deterministic randomized simulation.
//!
//! Random borrower and investor operations interleave with epoch closes,
//! challenge executions and time jumps. After every single step two books
//! must agree: the pool account's host currency equals the reserve plus
//! both tranches' custody, and the host's token custody equals the
//! tranches' token books. Currency is also globally conserved, the engine
//! can neither print nor destroy it.

use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;

use strata_pool::math::{RAY, WAD};
use strata_pool::{
    Addr, CollateralRef, Host, MemoryHost, Phase, Pool, PoolParams, RiskClass, TrancheId,
    WriteDownPolicy,
};

const ROOT: Addr = 1;
const POOL_ACCOUNT: Addr = 100;
const BORROWER: Addr = 2;
const NFT_REGISTRY: Addr = 500;
const SENIOR_INVESTORS: [Addr; 2] = [10, 11];
const JUNIOR_INVESTORS: [Addr; 2] = [20, 21];

const HOUR: u64 = 3_600;

/// 10% and 4% APR, compounded per second.
const RATE_10_APR: u128 = 1_000_000_003_170_979_198_376_458_650;
const RATE_4_APR: u128 = 1_000_000_001_268_391_679_350_583_460;

fn assert_conserved(pool: &Pool, host: &MemoryHost) {
    assert_eq!(
        host.currency_balance(pool.account),
        pool.reserve.balance() + pool.senior.currency_held + pool.junior.currency_held,
        "pool account out of sync with reserve and tranche custody",
    );
    assert_eq!(host.tranche_balance(TrancheId::Senior, pool.account), pool.senior.tokens_held);
    assert_eq!(host.tranche_balance(TrancheId::Junior, pool.account), pool.junior.tokens_held);
}

struct Sim {
    pool: Pool,
    host: MemoryHost,
    loans: Vec<u64>,
    now: u64,
    total_currency: u128,
}

impl Sim {
    fn new() -> Self {
        let params = PoolParams {
            version: 0,
            min_epoch_time: HOUR,
            challenge_time: HOUR,
            min_senior_ratio: 0,
            max_senior_ratio: RAY,
            max_reserve: 1_000_000 * WAD,
        };
        let mut pool = Pool::new(ROOT, POOL_ACCOUNT, params, RATE_4_APR, 0);
        let mut host = MemoryHost::new();
        pool.file_rate(ROOT, 1, RATE_10_APR, 0).unwrap();
        pool.file_risk_class(
            ROOT,
            1,
            RiskClass {
                ltv: RAY / 2,
                liquidation_ratio: 3 * (RAY / 5),
                rate_class: 1,
                write_down: WriteDownPolicy::None,
                write_off: vec![],
            },
        )
        .unwrap();

        for inv in SENIOR_INVESTORS {
            host.update_member(TrancheId::Senior, inv, u64::MAX);
            host.mint_currency(inv, 10_000 * WAD);
        }
        for inv in JUNIOR_INVESTORS {
            host.update_member(TrancheId::Junior, inv, u64::MAX);
            host.mint_currency(inv, 10_000 * WAD);
        }
        host.mint_currency(BORROWER, 10_000 * WAD);

        let mut loans = Vec::new();
        for id in 0..3u64 {
            let nft = CollateralRef { registry: NFT_REGISTRY, id };
            host.issue_collateral(nft, BORROWER);
            pool.price(ROOT, nft, 100 * WAD, 1).unwrap();
            let loan = pool.issue(&host, BORROWER, nft).unwrap();
            pool.lock(&mut host, BORROWER, loan, 0).unwrap();
            loans.push(loan);
        }

        let total_currency = host.total_currency();
        Sim { pool, host, loans, now: 0, total_currency }
    }

    fn pick_investor(&self, rng: &mut XorShiftRng) -> (Addr, TrancheId) {
        if rng.gen_bool(0.5) {
            (SENIOR_INVESTORS[rng.gen_range(0..2)], TrancheId::Senior)
        } else {
            (JUNIOR_INVESTORS[rng.gen_range(0..2)], TrancheId::Junior)
        }
    }

    fn step(&mut self, rng: &mut XorShiftRng) {
        match rng.gen_range(0..9u32) {
            0 | 1 => {
                let (inv, tranche) = self.pick_investor(rng);
                let amount = rng.gen_range(1..=50u128) * WAD;
                let _ = self.pool.supply_order(&mut self.host, inv, tranche, amount, self.now);
            }
            2 => {
                let (inv, tranche) = self.pick_investor(rng);
                let bal = self.host.tranche_balance(tranche, inv);
                if bal > 0 {
                    let amount = rng.gen_range(1..=bal);
                    let _ = self.pool.redeem_order(&mut self.host, inv, tranche, amount, self.now);
                }
            }
            3 => {
                let (inv, tranche) = self.pick_investor(rng);
                let _ = self.pool.disburse(&mut self.host, inv, tranche);
            }
            4 => {
                let loan = self.loans[rng.gen_range(0..self.loans.len())];
                let amount = rng.gen_range(1..=20u128) * WAD;
                let _ = self.pool.borrow(&mut self.host, BORROWER, loan, amount, self.now);
            }
            5 => {
                let loan = self.loans[rng.gen_range(0..self.loans.len())];
                let debt = self.pool.ledger.debt(loan, self.now).unwrap();
                if debt > 0 {
                    let amount = rng.gen_range(1..=debt);
                    let _ = self.pool.repay(&mut self.host, BORROWER, loan, amount, self.now);
                }
            }
            6 => {
                let _ = self.pool.close_epoch(&mut self.host, ROOT, self.now);
            }
            7 => {
                let _ = self.pool.execute_epoch(&mut self.host, ROOT, self.now);
            }
            8 => {
                self.now += rng.gen_range(1..2 * HOUR);
            }
            _ => unreachable!(),
        }
        self.check();
    }

    fn check(&self) {
        assert_conserved(&self.pool, &self.host);
        assert_eq!(self.host.total_currency(), self.total_currency, "currency not conserved");
    }

    /// Settle every outstanding epoch and pay everyone out.
    fn drain(&mut self) {
        if let Phase::Challenge { end } = self.pool.coordinator.phase {
            self.now = self.now.max(end);
            self.pool.execute_epoch(&mut self.host, ROOT, self.now).unwrap();
            self.check();
        }
        // One more close settles the orders placed since the last one.
        self.now += HOUR;
        self.pool.close_epoch(&mut self.host, ROOT, self.now).unwrap();
        if let Phase::Challenge { end } = self.pool.coordinator.phase {
            self.now = self.now.max(end);
            self.pool.execute_epoch(&mut self.host, ROOT, self.now).unwrap();
        }
        self.check();

        for inv in SENIOR_INVESTORS {
            self.pool.disburse(&mut self.host, inv, TrancheId::Senior).unwrap();
            assert!(self.pool.senior.order(inv).is_none());
        }
        for inv in JUNIOR_INVESTORS {
            self.pool.disburse(&mut self.host, inv, TrancheId::Junior).unwrap();
            assert!(self.pool.junior.order(inv).is_none());
        }
        self.check();
    }
}

fn run(seed: u64, iterations: usize) {
    let mut rng = XorShiftRng::seed_from_u64(seed);
    let mut sim = Sim::new();
    sim.check();
    for _ in 0..iterations {
        sim.step(&mut rng);
    }
    sim.drain();
}

#[test]
fn conservation_seed_42() {
    run(42, 800);
}

#[test]
fn conservation_seed_1337() {
    run(1337, 800);
}

#[test]
fn conservation_seed_sweep() {
    for seed in 0..20 {
        run(seed, 150);
    }
}
