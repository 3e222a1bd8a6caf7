//! Withheld transfer-fee analytics

use reflector_sdk::{state::unpack_token_account, AccountFilter, Ledger, SdkResult};
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WithheldSummary {
    pub accounts_scanned: usize,
    pub accounts_with_fees: usize,
    /// Withheld on token accounts plus already harvested to the mint
    pub total_withheld: u64,
    pub mint_withheld: u64,
    pub decimals: u8,
}

impl WithheldSummary {
    pub fn ui_total(&self) -> f64 {
        self.total_withheld as f64 / 10f64.powi(i32::from(self.decimals))
    }
}

/// Sum the transfer fees withheld across every Token-2022 account of `mint`
pub async fn scan_withheld(ledger: &dyn Ledger, mint: &Pubkey) -> SdkResult<WithheldSummary> {
    let mint_info = ledger.mint(mint).await?;
    let accounts = ledger
        .program_accounts(&spl_token_2022::id(), vec![AccountFilter::pubkey_at(0, mint)])
        .await?;

    let mut summary = WithheldSummary {
        accounts_scanned: accounts.len(),
        accounts_with_fees: 0,
        total_withheld: mint_info.withheld,
        mint_withheld: mint_info.withheld,
        decimals: mint_info.decimals,
    };

    for (address, account) in &accounts {
        match unpack_token_account(&account.data) {
            Ok(info) if info.withheld > 0 => {
                summary.accounts_with_fees += 1;
                summary.total_withheld = summary.total_withheld.saturating_add(info.withheld);
            }
            Ok(_) => {}
            Err(e) => debug!("Skipping {}: {}", address, e),
        }
    }

    info!(
        "{} accounts scanned, {} withholding fees, {} withheld in total ({} on the mint)",
        summary.accounts_scanned,
        summary.accounts_with_fees,
        summary.ui_total(),
        summary.mint_withheld
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reflector_sdk::testing::{mint_account, token_account, token_account_with_withheld, MockLedger};

    #[tokio::test]
    async fn test_sums_withheld_fees() {
        let ledger = MockLedger::new();
        let mint = Pubkey::new_unique();
        ledger.set_account(mint, mint_account(1_000_000, 3, spl_token_2022::id()));

        for withheld in [0, 250, 1_000] {
            ledger.set_account(
                Pubkey::new_unique(),
                token_account_with_withheld(mint, Pubkey::new_unique(), 10, withheld).unwrap(),
            );
        }
        ledger.set_account(
            Pubkey::new_unique(),
            token_account(mint, Pubkey::new_unique(), 10, spl_token_2022::id()),
        );
        // Another mint's fees are not counted
        ledger.set_account(
            Pubkey::new_unique(),
            token_account_with_withheld(Pubkey::new_unique(), Pubkey::new_unique(), 10, 99).unwrap(),
        );

        let summary = scan_withheld(&ledger, &mint).await.unwrap();
        assert_eq!(summary.accounts_scanned, 4);
        assert_eq!(summary.accounts_with_fees, 2);
        assert_eq!(summary.total_withheld, 1_250);
        assert!((summary.ui_total() - 1.25).abs() < 1e-12);
    }
}
