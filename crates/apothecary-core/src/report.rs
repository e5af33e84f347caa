//! # Sales Reporting
//!
//! Aggregates ledger rows into the figures shown on the reports and
//! accounting screens. Pure: callers fetch the sales and expenses first.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{Expense, PaymentMethod, Sale, SaleStatus};

/// Revenue for one payment method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentBreakdown {
    pub method: PaymentMethod,
    pub sales: usize,
    pub revenue_minor: i64,
}

/// Financial summary over a set of sales and expenses.
///
/// Retracted sales are counted but contribute nothing to revenue or cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SalesReport {
    pub completed_sales: usize,
    pub retracted_sales: usize,
    pub units_sold: i64,
    pub revenue_minor: i64,
    pub cost_of_goods_minor: i64,
    pub gross_profit_minor: i64,
    pub expenses_minor: i64,
    pub net_profit_minor: i64,
    pub by_payment_method: Vec<PaymentBreakdown>,
}

impl SalesReport {
    /// Builds the report.
    ///
    /// ## Example
    /// ```rust
    /// use apothecary_core::report::SalesReport;
    ///
    /// let report = SalesReport::summarize(&[], &[]);
    /// assert_eq!(report.revenue_minor, 0);
    /// assert_eq!(report.by_payment_method.len(), 3);
    /// ```
    pub fn summarize(sales: &[Sale], expenses: &[Expense]) -> Self {
        let mut completed_sales = 0;
        let mut retracted_sales = 0;
        let mut units_sold = 0;
        let mut revenue = Money::zero();
        let mut cost = Money::zero();
        let mut by_payment_method: Vec<PaymentBreakdown> = PaymentMethod::ALL
            .iter()
            .map(|&method| PaymentBreakdown {
                method,
                sales: 0,
                revenue_minor: 0,
            })
            .collect();

        for sale in sales {
            match sale.status {
                SaleStatus::Retracted => retracted_sales += 1,
                SaleStatus::Completed => {
                    completed_sales += 1;
                    units_sold += sale.unit_count();
                    revenue += sale.total_amount();
                    cost += sale.cost_of_goods();

                    if let Some(entry) = by_payment_method
                        .iter_mut()
                        .find(|b| b.method == sale.payment_method)
                    {
                        entry.sales += 1;
                        entry.revenue_minor += sale.total_amount_minor;
                    }
                }
            }
        }

        let expenses: Money = expenses.iter().map(Expense::amount).sum();
        let gross = revenue - cost;

        SalesReport {
            completed_sales,
            retracted_sales,
            units_sold,
            revenue_minor: revenue.minor(),
            cost_of_goods_minor: cost.minor(),
            gross_profit_minor: gross.minor(),
            expenses_minor: expenses.minor(),
            net_profit_minor: (gross - expenses).minor(),
            by_payment_method,
        }
    }
}
