//! # JSON-RPC Methods
//!
//! Every method takes a single named-parameter object. Write methods carry
//! the acting identity in `from`; the ledger and the modules decide whether
//! that identity may do what it asks. The node itself authenticates nothing.
//!
//! | Method                  | Acts as        | Ledger entry point                          |
//! |-------------------------|----------------|---------------------------------------------|
//! | `trove_createBasket`    | anyone         | factory `create` (+ module initialization)  |
//! | `trove_addModule`       | manager        | `add_module_to_basket`                      |
//! | `trove_initializeModule`| manager        | module `initialize`                         |
//! | `trove_removeModule`    | manager        | module `remove`                             |
//! | `trove_approve`         | token owner    | `approve`                                   |
//! | `trove_transfer`        | token owner    | `transfer`                                  |
//! | `trove_transferShares`  | share holder   | `transfer_shares`                           |
//! | `trove_issue`           | depositor      | issuance `issue`                            |
//! | `trove_redeem`          | share holder   | issuance `redeem`                           |
//! | `trove_trade`           | manager        | trade `trade`                               |
//! | `trove_addLiquidity`    | manager        | AMM `add_liquidity`                         |
//! | `trove_removeLiquidity` | manager        | AMM `remove_liquidity`                      |
//! | `trove_buy`             | buyer          | fund `buy`                                  |
//! | `trove_getBasket`       | (read)         | basket view                                 |
//! | `trove_requiredUnits`   | (read)         | issuance `required_component_units_for_issue`|

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use trove_modules::{AddLiquidityParams, BuyParams, ModuleError, RemoveLiquidityParams, TradeParams};
use trove_protocol::math::u128_string;
use trove_protocol::{Address, BasketRequest, LedgerError};

use crate::genesis::NodeContext;
use crate::views::{BasketView, Holding};

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// Must be "2.0".
    pub jsonrpc: String,
    pub method: String,
    pub params: Option<Value>,
    pub id: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
/// The ledger or a module refused the operation; `data.kind` names why.
pub const LEDGER_REJECTED: i32 = -32000;
pub const UNKNOWN_BASKET: i32 = -32001;

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

/// Why a method call produced no result.
#[derive(Debug)]
pub enum RpcFailure {
    InvalidParams(String),
    MethodNotFound(String),
    /// The module exists in the registry but this node does not run it.
    NotHosted(Address),
    Rejected(ModuleError),
}

impl From<ModuleError> for RpcFailure {
    fn from(err: ModuleError) -> Self {
        RpcFailure::Rejected(err)
    }
}

impl From<LedgerError> for RpcFailure {
    fn from(err: LedgerError) -> Self {
        RpcFailure::Rejected(err.into())
    }
}

impl RpcFailure {
    /// Label for the failure metric.
    pub fn kind(&self) -> &'static str {
        match self {
            RpcFailure::InvalidParams(_) => "InvalidParams",
            RpcFailure::MethodNotFound(_) => "MethodNotFound",
            RpcFailure::NotHosted(_) => "NotHosted",
            RpcFailure::Rejected(err) => err.kind(),
        }
    }

    pub fn into_error(self) -> JsonRpcError {
        match self {
            RpcFailure::InvalidParams(message) => JsonRpcError {
                code: INVALID_PARAMS,
                message: format!("Invalid params: {message}"),
                data: None,
            },
            RpcFailure::MethodNotFound(method) => JsonRpcError {
                code: METHOD_NOT_FOUND,
                message: format!("Method not found: {method}"),
                data: None,
            },
            RpcFailure::NotHosted(module) => JsonRpcError {
                code: INVALID_PARAMS,
                message: format!("Invalid params: module {module} is not hosted by this node"),
                data: None,
            },
            RpcFailure::Rejected(err) => {
                let kind = err.kind();
                JsonRpcError {
                    code: if kind == "UnknownBasket" { UNKNOWN_BASKET } else { LEDGER_REJECTED },
                    message: err.to_string(),
                    data: Some(json!({ "kind": kind })),
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreateBasketArgs {
    from: Address,
    #[serde(flatten)]
    request: BasketRequest,
    /// Initialize every listed module right away (requires `from` to be the
    /// manager).
    #[serde(default)]
    initialize: bool,
}

#[derive(Debug, Deserialize)]
struct ModuleArgs {
    from: Address,
    basket: Address,
    module: Address,
}

#[derive(Debug, Deserialize)]
struct ApproveArgs {
    from: Address,
    asset: Address,
    spender: Address,
    #[serde(with = "u128_string")]
    amount: u128,
}

#[derive(Debug, Deserialize)]
struct TransferArgs {
    from: Address,
    asset: Address,
    to: Address,
    #[serde(with = "u128_string")]
    amount: u128,
}

#[derive(Debug, Deserialize)]
struct ShareTransferArgs {
    from: Address,
    basket: Address,
    to: Address,
    #[serde(with = "u128_string")]
    amount: u128,
}

#[derive(Debug, Deserialize)]
struct QuantityArgs {
    from: Address,
    basket: Address,
    #[serde(with = "u128_string")]
    quantity: u128,
    /// Defaults to `from`.
    recipient: Option<Address>,
}

#[derive(Debug, Deserialize)]
struct ManagedArgs<P> {
    from: Address,
    basket: Address,
    #[serde(flatten)]
    params: P,
}

#[derive(Debug, Deserialize)]
struct BasketArgs {
    basket: Address,
}

#[derive(Debug, Deserialize)]
struct RequiredUnitsArgs {
    basket: Address,
    #[serde(with = "u128_string")]
    quantity: u128,
}

fn parse<T: DeserializeOwned>(params: Option<Value>) -> Result<T, RpcFailure> {
    serde_json::from_value(params.unwrap_or_else(|| json!({})))
        .map_err(|e| RpcFailure::InvalidParams(e.to_string()))
}

fn amount(value: u128) -> Value {
    Value::String(value.to_string())
}

fn amounts(values: &[u128]) -> Value {
    Value::Array(values.iter().copied().map(amount).collect())
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, RpcFailure> {
    serde_json::to_value(value).map_err(|e| RpcFailure::InvalidParams(e.to_string()))
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Methods that only read the ledger.
pub fn is_query(method: &str) -> bool {
    matches!(method, "trove_getBasket" | "trove_requiredUnits")
}

/// Runs a read-only method.
pub fn query(context: &NodeContext, method: &str, params: Option<Value>) -> Result<Value, RpcFailure> {
    match method {
        "trove_getBasket" => {
            let args: BasketArgs = parse(params)?;
            let basket = context.engine.basket(&args.basket)?;
            to_json(&BasketView::of(&context.engine, basket)?)
        }
        "trove_requiredUnits" => {
            let args: RequiredUnitsArgs = parse(params)?;
            let required = context.modules.issuance.required_component_units_for_issue(
                &context.engine,
                &args.basket,
                args.quantity,
            )?;
            to_json(&Holding::list(required))
        }
        other => Err(RpcFailure::MethodNotFound(other.to_string())),
    }
}

/// Runs a write method. A refused call leaves the ledger untouched.
pub fn apply(context: &mut NodeContext, method: &str, params: Option<Value>) -> Result<Value, RpcFailure> {
    let NodeContext {
        engine,
        factory,
        modules,
    } = context;

    match method {
        "trove_createBasket" => {
            let args: CreateBasketArgs = parse(params)?;
            if args.initialize {
                if let Some(missing) = args.request.modules.iter().find(|m| modules.get(m).is_none()) {
                    return Err(RpcFailure::NotHosted(missing.clone()));
                }
            }
            let basket = engine.atomically("rpc_create_basket", |engine| {
                let basket = factory.create(engine, args.request.clone())?;
                if args.initialize {
                    for module in args.request.modules.iter().filter_map(|m| modules.get(m)) {
                        module.initialize(engine, &args.from, &basket)?;
                    }
                }
                Ok::<_, ModuleError>(basket)
            })?;
            Ok(json!({ "basket": basket }))
        }
        "trove_addModule" => {
            let args: ModuleArgs = parse(params)?;
            engine.add_module_to_basket(&args.from, &args.basket, &args.module)?;
            module_state(engine, &args)
        }
        "trove_initializeModule" => {
            let args: ModuleArgs = parse(params)?;
            let module = modules
                .get(&args.module)
                .ok_or_else(|| RpcFailure::NotHosted(args.module.clone()))?;
            module.initialize(engine, &args.from, &args.basket)?;
            module_state(engine, &args)
        }
        "trove_removeModule" => {
            let args: ModuleArgs = parse(params)?;
            let module = modules
                .get(&args.module)
                .ok_or_else(|| RpcFailure::NotHosted(args.module.clone()))?;
            module.remove(engine, &args.from, &args.basket)?;
            module_state(engine, &args)
        }
        "trove_approve" => {
            let args: ApproveArgs = parse(params)?;
            engine.approve(&args.from, &args.asset, &args.spender, args.amount);
            let allowance = engine.tokens().allowance(&args.asset, &args.from, &args.spender);
            Ok(json!({ "allowance": amount(allowance) }))
        }
        "trove_transfer" => {
            let args: TransferArgs = parse(params)?;
            engine.transfer(&args.from, &args.asset, &args.to, args.amount)?;
            Ok(json!({ "balance": amount(engine.balance_of(&args.asset, &args.from)) }))
        }
        "trove_transferShares" => {
            let args: ShareTransferArgs = parse(params)?;
            engine.transfer_shares(&args.from, &args.basket, &args.to, args.amount)?;
            let shares = engine.basket(&args.basket)?.balance_of(&args.from);
            Ok(json!({ "shares": amount(shares) }))
        }
        "trove_issue" => {
            let args: QuantityArgs = parse(params)?;
            let recipient = args.recipient.unwrap_or_else(|| args.from.clone());
            let deposited =
                modules
                    .issuance
                    .required_component_units_for_issue(engine, &args.basket, args.quantity)?;
            modules
                .issuance
                .issue(engine, &args.from, &args.basket, args.quantity, &recipient)?;
            Ok(json!({
                "quantity": amount(args.quantity),
                "recipient": recipient,
                "deposited": Holding::list(deposited),
            }))
        }
        "trove_redeem" => {
            let args: QuantityArgs = parse(params)?;
            let recipient = args.recipient.unwrap_or_else(|| args.from.clone());
            let paid = modules
                .issuance
                .redeem(engine, &args.from, &args.basket, args.quantity, &recipient)?;
            Ok(json!({
                "quantity": amount(args.quantity),
                "recipient": recipient,
                "paid": Holding::list(paid),
            }))
        }
        "trove_trade" => {
            let args: ManagedArgs<TradeParams> = parse(params)?;
            let receipt = modules.trade.trade(engine, &args.from, &args.basket, &args.params)?;
            Ok(json!({ "spent": amount(receipt.spent), "received": amount(receipt.received) }))
        }
        "trove_addLiquidity" => {
            let args: ManagedArgs<AddLiquidityParams> = parse(params)?;
            let receipt = modules
                .amm
                .add_liquidity(engine, &args.from, &args.basket, &args.params)?;
            Ok(json!({ "liquidity": amount(receipt.liquidity), "amounts": amounts(&receipt.amounts) }))
        }
        "trove_removeLiquidity" => {
            let args: ManagedArgs<RemoveLiquidityParams> = parse(params)?;
            let receipt = modules
                .amm
                .remove_liquidity(engine, &args.from, &args.basket, &args.params)?;
            Ok(json!({ "liquidity": amount(receipt.liquidity), "amounts": amounts(&receipt.amounts) }))
        }
        "trove_buy" => {
            let args: ManagedArgs<BuyParams> = parse(params)?;
            let receipt = modules.fund.buy(engine, &args.from, &args.basket, &args.params)?;
            Ok(json!({
                "shares": amount(receipt.shares),
                "deposited": Holding::list(receipt.deposited),
                "refunded": Holding::list(receipt.refunded),
            }))
        }
        other => Err(RpcFailure::MethodNotFound(other.to_string())),
    }
}

fn module_state(engine: &trove_protocol::Engine, args: &ModuleArgs) -> Result<Value, RpcFailure> {
    let state = engine.basket(&args.basket)?.module_state(&args.module);
    Ok(json!({ "basket": args.basket, "module": args.module, "state": state }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genesis::Genesis;
    use trove_protocol::ModuleState;

    fn devnet() -> NodeContext {
        Genesis::devnet().unwrap().build().unwrap()
    }

    fn dpi(context: &NodeContext) -> Address {
        context.engine.baskets().next().unwrap().address().clone()
    }

    #[test]
    fn unknown_basket_maps_to_its_own_code() {
        let context = devnet();
        let err = query(&context, "trove_getBasket", Some(json!({ "basket": "0xnope" }))).unwrap_err();
        let error = err.into_error();
        assert_eq!(error.code, UNKNOWN_BASKET);
        assert_eq!(error.data.unwrap()["kind"], "UnknownBasket");
    }

    #[test]
    fn missing_fields_are_invalid_params() {
        let mut context = devnet();
        let err = apply(&mut context, "trove_issue", Some(json!({ "from": "alice" }))).unwrap_err();
        assert_eq!(err.kind(), "InvalidParams");
        assert_eq!(err.into_error().code, INVALID_PARAMS);
    }

    #[test]
    fn create_basket_and_initialize_in_one_call() {
        let mut context = devnet();
        let result = apply(
            &mut context,
            "trove_createBasket",
            Some(json!({
                "from": "carol",
                "manager": "carol",
                "name": "Solo",
                "symbol": "SOLO",
                "components": ["WETH"],
                "units": ["1000000000000000000"],
                "modules": ["mod-issuance"],
                "initialize": true,
            })),
        )
        .unwrap();
        let basket = Address::new(result["basket"].as_str().unwrap());
        assert_eq!(
            context.engine.basket(&basket).unwrap().module_state(&"mod-issuance".into()),
            ModuleState::Initialized
        );
    }

    #[test]
    fn failed_initialization_rolls_back_creation() {
        let mut context = devnet();
        let baskets_before = context.engine.baskets().count();
        let err = apply(
            &mut context,
            "trove_createBasket",
            Some(json!({
                "from": "mallory",
                "manager": "carol",
                "name": "Solo",
                "symbol": "SOLO",
                "components": ["WETH"],
                "units": ["1"],
                "modules": ["mod-issuance"],
                "initialize": true,
            })),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "NotManager");
        assert_eq!(context.engine.baskets().count(), baskets_before);
    }

    #[test]
    fn issue_reports_deposits_and_redeem_reports_payouts() {
        let mut context = devnet();
        let basket = dpi(&context);
        for asset in ["WETH", "WBTC"] {
            apply(
                &mut context,
                "trove_approve",
                Some(json!({ "from": "alice", "asset": asset, "spender": "mod-issuance", "amount": "1000000000000000000000" })),
            )
            .unwrap();
        }

        let issued = apply(
            &mut context,
            "trove_issue",
            Some(json!({ "from": "alice", "basket": basket, "quantity": "2000000000000000000" })),
        )
        .unwrap();
        assert_eq!(issued["recipient"], "alice");
        assert_eq!(issued["deposited"][0]["asset"], "WETH");
        assert_eq!(issued["deposited"][0]["amount"], "1000000000000000000");
        assert_eq!(issued["deposited"][1]["amount"], "40000000000000000");

        let redeemed = apply(
            &mut context,
            "trove_redeem",
            Some(json!({ "from": "alice", "basket": basket, "quantity": "1000000000000000000", "recipient": "bob" })),
        )
        .unwrap();
        assert_eq!(redeemed["paid"][0]["amount"], "500000000000000000");
        assert_eq!(
            context.engine.balance_of(&"WBTC".into(), &"bob".into()),
            20_000_000_000_000_000
        );
    }

    #[test]
    fn share_transfer_moves_issued_shares() {
        let mut context = devnet();
        let basket = dpi(&context);
        context
            .engine
            .mint_shares(&"mod-issuance".into(), &basket, &"alice".into(), 10)
            .unwrap();

        let result = apply(
            &mut context,
            "trove_transferShares",
            Some(json!({ "from": "alice", "basket": basket, "to": "bob", "amount": "4" })),
        )
        .unwrap();
        assert_eq!(result["shares"], "6");
        assert_eq!(context.engine.basket(&basket).unwrap().balance_of(&"bob".into()), 4);

        let err = apply(
            &mut context,
            "trove_transferShares",
            Some(json!({ "from": "bob", "basket": basket, "to": "alice", "amount": "5" })),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "InsufficientBalance");
    }

    #[test]
    fn manager_methods_reject_other_callers() {
        let mut context = devnet();
        let basket = dpi(&context);
        let err = apply(
            &mut context,
            "trove_trade",
            Some(json!({
                "from": "alice",
                "basket": basket,
                "integration": "cpamm",
                "source": "WETH",
                "destination": "WBTC",
                "source_unit": "1",
                "min_destination_unit": "0",
            })),
        )
        .unwrap_err();
        let error = err.into_error();
        assert_eq!(error.code, LEDGER_REJECTED);
        assert_eq!(error.data.unwrap()["kind"], "NotManager");
    }

    #[test]
    fn unhosted_module_cannot_be_initialized() {
        let mut context = devnet();
        let basket = dpi(&context);
        let err = apply(
            &mut context,
            "trove_initializeModule",
            Some(json!({ "from": "manager", "basket": basket, "module": "mod-elsewhere" })),
        )
        .unwrap_err();
        assert!(matches!(err, RpcFailure::NotHosted(_)));
    }

    #[test]
    fn reads_are_not_writes() {
        assert!(is_query("trove_getBasket"));
        assert!(!is_query("trove_issue"));
        let mut context = devnet();
        let err = apply(&mut context, "trove_getBasket", None).unwrap_err();
        assert_eq!(err.kind(), "MethodNotFound");
    }
}
