//! # Engine
//!
//! The host execution environment. One [`Engine`] owns the registry, the
//! adapter directory, every basket, the token ledger and the event log, and
//! is the only way to reach any of them mutably.
//!
//! ## Atomicity
//!
//! Operations are serialized: the engine is `&mut` for the whole call. A
//! top-level operation that can fail halfway (a module's business logic, an
//! adapter invocation, basket creation) runs inside
//! [`atomically`](Engine::atomically), which snapshots the ledger state and
//! restores it on error. The event log is append-only and stays out of the
//! snapshot: a rollback truncates it back to where the operation started,
//! and the retention cap is applied only once an outermost operation
//! commits. Single-step primitives validate everything before writing
//! anything, so they need no snapshot.
//!
//! ## Authorization
//!
//! Every entry point takes the caller's identity first. Checks happen here,
//! in one place, in a fixed order for basket primitives:
//!
//! 1. the basket exists ([`LedgerError::UnknownBasket`]);
//! 2. no other module's operation is in flight ([`LedgerError::ReentrantCall`]);
//! 3. the caller is initialized on the basket ([`LedgerError::ModuleNotInitialized`]);
//! 4. the caller is still a registry-approved module ([`LedgerError::Unauthorized`]).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapter::{Adapter, CallData, Intent, Invocation, Quote, TokenFlow};
use crate::basket::{Basket, BasketRequest, ComponentChange};
use crate::config::LedgerConfig;
use crate::directory::AdapterDirectory;
use crate::error::LedgerError;
use crate::events::{EventLog, EventRecord, LedgerEvent};
use crate::registry::Registry;
use crate::tokens::TokenLedger;
use crate::types::{Address, ModuleState, ResourceId};

/// Everything an operation can change apart from the event log. Cloned
/// wholesale for rollback.
#[derive(Debug, Clone)]
struct LedgerState {
    registry: Registry,
    directory: AdapterDirectory,
    baskets: BTreeMap<Address, Basket>,
    tokens: TokenLedger,
    deploy_nonces: BTreeMap<Address, u64>,
}

/// The ledger host.
pub struct Engine {
    config: LedgerConfig,
    state: LedgerState,
    events: EventLog,
    operation: Option<Uuid>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("baskets", &self.state.baskets.len())
            .field("events", &self.events.next_sequence())
            .finish()
    }
}

impl Engine {
    /// Creates an empty ledger governed by `admin`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidArgument`] if `config` is invalid.
    pub fn new(admin: Address, config: LedgerConfig) -> Result<Self, LedgerError> {
        config.validate().map_err(LedgerError::InvalidArgument)?;
        info!(admin = %admin, unit_scale = %config.unit_scale, "ledger engine created");
        Ok(Self {
            config,
            state: LedgerState {
                registry: Registry::new(admin.clone()),
                directory: AdapterDirectory::new(admin),
                baskets: BTreeMap::new(),
                tokens: TokenLedger::new(),
                deploy_nonces: BTreeMap::new(),
            },
            events: EventLog::new(),
            operation: None,
        })
    }

    // -----------------------------------------------------------------------
    // Atomic execution
    // -----------------------------------------------------------------------

    /// Runs `f` as one all-or-nothing operation.
    ///
    /// On `Err` the ledger is restored to exactly what it was before `f`
    /// ran. Nested calls snapshot again, so an inner failure the outer
    /// closure recovers from still leaves no partial writes; all of them
    /// share the outermost operation id.
    pub fn atomically<T, E, F>(&mut self, label: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Engine) -> Result<T, E>,
        E: fmt::Display,
    {
        let snapshot = self.state.clone();
        let mark = self.events.next_sequence();
        let outermost = self.operation.is_none();
        if outermost {
            self.operation = Some(Uuid::new_v4());
        }

        let result = f(self);

        if let Err(err) = &result {
            warn!(operation = label, error = %err, "operation rolled back");
            self.state = snapshot;
            self.events.truncate(mark);
        }
        if outermost {
            self.operation = None;
            self.events.prune(self.config.event_retention);
        }
        result
    }

    /// Runs a module's business logic against `basket`.
    ///
    /// Requires `module` to be initialized and approved, then holds the
    /// basket's lock for the duration of `f`. Any other caller touching the
    /// basket meanwhile, and any second `operate` on it (even by `module`
    /// itself), fails [`LedgerError::ReentrantCall`]. Everything rolls back
    /// if `f` fails.
    pub fn operate<T, E, F>(&mut self, module: &Address, basket: &Address, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Engine) -> Result<T, E>,
        E: From<LedgerError> + fmt::Display,
    {
        self.atomically("operate", |engine| {
            engine.require_live_module(module, basket)?;
            engine.basket_mut(basket)?.acquire_lock(module)?;
            let out = f(engine)?;
            engine.basket_mut(basket)?.release_lock();
            Ok(out)
        })
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.state.registry
    }

    pub fn directory(&self) -> &AdapterDirectory {
        &self.state.directory
    }

    pub fn tokens(&self) -> &TokenLedger {
        &self.state.tokens
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Retained records emitted at or after `sequence`.
    pub fn events_since(&self, sequence: u64) -> &[EventRecord] {
        self.events.since(sequence)
    }

    /// The basket at `address`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownBasket`] if there is none.
    pub fn basket(&self, address: &Address) -> Result<&Basket, LedgerError> {
        self.state
            .baskets
            .get(address)
            .ok_or_else(|| LedgerError::UnknownBasket(address.clone()))
    }

    /// Every basket, sorted by address.
    pub fn baskets(&self) -> impl Iterator<Item = &Basket> {
        self.state.baskets.values()
    }

    /// Token balance of `holder` in `asset`.
    pub fn balance_of(&self, asset: &Address, holder: &Address) -> u128 {
        self.state.tokens.balance_of(asset, holder)
    }

    /// Adapter bound to `(module, name)`.
    pub fn resolve(&self, module: &Address, name: &str) -> Result<Arc<dyn Adapter>, LedgerError> {
        self.state.directory.resolve(module, name)
    }

    /// Asks `adapter` to price `intent` for `account`.
    pub fn quote(&self, adapter: &dyn Adapter, account: &Address, intent: &Intent) -> Result<Quote, LedgerError> {
        adapter.quote(self, account, intent)
    }

    // -----------------------------------------------------------------------
    // Registry administration
    // -----------------------------------------------------------------------

    pub fn add_module(&mut self, caller: &Address, module: Address) -> Result<(), LedgerError> {
        let fresh = !self.state.registry.is_module(&module);
        self.state.registry.add_module(caller, module.clone())?;
        if fresh {
            self.emit(LedgerEvent::ModuleApproved { module });
        }
        Ok(())
    }

    pub fn remove_module(&mut self, caller: &Address, module: &Address) -> Result<(), LedgerError> {
        self.state.registry.remove_module(caller, module)?;
        self.emit(LedgerEvent::ModuleRevoked {
            module: module.clone(),
        });
        Ok(())
    }

    pub fn add_factory(&mut self, caller: &Address, factory: Address) -> Result<(), LedgerError> {
        let fresh = !self.state.registry.is_factory(&factory);
        self.state.registry.add_factory(caller, factory.clone())?;
        if fresh {
            self.emit(LedgerEvent::FactoryApproved { factory });
        }
        Ok(())
    }

    pub fn remove_factory(&mut self, caller: &Address, factory: &Address) -> Result<(), LedgerError> {
        self.state.registry.remove_factory(caller, factory)?;
        self.emit(LedgerEvent::FactoryRevoked {
            factory: factory.clone(),
        });
        Ok(())
    }

    pub fn add_resource(&mut self, caller: &Address, id: ResourceId, endpoint: Address) -> Result<(), LedgerError> {
        self.state.registry.add_resource(caller, id, endpoint.clone())?;
        self.emit(LedgerEvent::ResourceAdded { id, endpoint });
        Ok(())
    }

    pub fn remove_resource(&mut self, caller: &Address, id: ResourceId) -> Result<Address, LedgerError> {
        let endpoint = self.state.registry.remove_resource(caller, id)?;
        self.emit(LedgerEvent::ResourceRemoved { id });
        Ok(endpoint)
    }

    /// Stops new modules from initializing on `basket`.
    pub fn disable_basket(&mut self, caller: &Address, basket: &Address) -> Result<(), LedgerError> {
        self.state.registry.disable_basket(caller, basket)?;
        self.emit(LedgerEvent::BasketDisabled {
            basket: basket.clone(),
        });
        Ok(())
    }

    /// Binds `adapter` for `module` under `name`. The module must be
    /// registry-approved.
    pub fn bind_integration(
        &mut self,
        caller: &Address,
        module: Address,
        name: &str,
        adapter: Arc<dyn Adapter>,
    ) -> Result<(), LedgerError> {
        if caller == self.state.registry.admin() && !self.state.registry.is_module(&module) {
            return Err(LedgerError::NotAModule(module));
        }
        let adapter_name = adapter.name().to_string();
        self.state
            .directory
            .bind(caller, module.clone(), name, adapter)?;
        self.emit(LedgerEvent::IntegrationBound {
            module,
            name: name.to_string(),
            adapter: adapter_name,
        });
        Ok(())
    }

    pub fn unbind_integration(&mut self, caller: &Address, module: &Address, name: &str) -> Result<(), LedgerError> {
        self.state.directory.unbind(caller, module, name)?;
        self.emit(LedgerEvent::IntegrationUnbound {
            module: module.clone(),
            name: name.to_string(),
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Basket deployment
    // -----------------------------------------------------------------------

    /// Deploys a basket without registering it. Such a basket can hold
    /// positions and pending modules, but no module can ever initialize on
    /// it ([`LedgerError::BasketNotEnabled`]).
    pub fn deploy_basket(&mut self, deployer: &Address, request: BasketRequest) -> Result<Address, LedgerError> {
        self.atomically("deploy_basket", |engine| {
            let address = engine.build_basket(deployer, &request)?;
            engine.emit(LedgerEvent::BasketCreated {
                basket: address.clone(),
                factory: None,
                manager: request.manager.clone(),
                name: request.name.clone(),
                symbol: request.symbol.clone(),
                components: request.components.clone(),
            });
            Ok(address)
        })
    }

    /// Validates `request` and inserts the resulting basket at the
    /// deployer's next derived address. Emits position and module events but
    /// not `BasketCreated`.
    pub(crate) fn build_basket(&mut self, deployer: &Address, request: &BasketRequest) -> Result<Address, LedgerError> {
        validate_request(request, &self.config)?;
        for module in &request.modules {
            if !self.state.registry.is_module(module) {
                return Err(LedgerError::NotAModule(module.clone()));
            }
        }

        let nonce = self.state.deploy_nonces.entry(deployer.clone()).or_insert(0);
        let address = Address::derive(deployer, *nonce);
        *nonce += 1;
        if self.state.baskets.contains_key(&address) {
            return Err(LedgerError::InvariantViolation(format!(
                "derived basket address {address} already in use"
            )));
        }

        let mut basket = Basket::new(
            address.clone(),
            request.name.clone(),
            request.symbol.clone(),
            request.manager.clone(),
            self.config.unit_scale,
            self.config.max_components,
            request.share_split.clone(),
        );
        let mut emitted = Vec::new();
        for (component, unit) in request.components.iter().zip(&request.units) {
            basket.set_default_position(component, *unit)?;
            emitted.push(LedgerEvent::ComponentAdded {
                basket: address.clone(),
                component: component.clone(),
            });
            emitted.push(LedgerEvent::DefaultPositionEdited {
                basket: address.clone(),
                component: component.clone(),
                unit: *unit,
            });
        }
        for module in &request.modules {
            basket.begin_pending(module)?;
            emitted.push(LedgerEvent::ModuleAdded {
                basket: address.clone(),
                module: module.clone(),
            });
        }

        self.state.baskets.insert(address.clone(), basket);
        for event in emitted {
            self.emit(event);
        }
        Ok(address)
    }

    pub(crate) fn register_basket(&mut self, factory: &Address, basket: &Address) -> Result<(), LedgerError> {
        self.state.registry.register_basket(factory, basket.clone())
    }

    // -----------------------------------------------------------------------
    // Module lifecycle
    // -----------------------------------------------------------------------

    /// Manager attaches `module` as pending.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`] unless `caller` manages the basket;
    /// [`LedgerError::NotAModule`] if `module` is not approved;
    /// [`LedgerError::AlreadyPending`] if it is already attached.
    pub fn add_module_to_basket(&mut self, caller: &Address, basket: &Address, module: &Address) -> Result<(), LedgerError> {
        let is_module = self.state.registry.is_module(module);
        let target = self.basket_mut(basket)?;
        target.ensure_not_locked_by_other(caller)?;
        target.require_manager(caller, "add modules to the basket")?;
        if !is_module {
            return Err(LedgerError::NotAModule(module.clone()));
        }
        target.begin_pending(module)?;
        info!(basket = %basket, module = %module, "module added (pending)");
        self.emit(LedgerEvent::ModuleAdded {
            basket: basket.clone(),
            module: module.clone(),
        });
        Ok(())
    }

    /// `module` (the caller) completes its own initialization.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotPending`] unless pending;
    /// [`LedgerError::BasketNotEnabled`] if the basket was not created
    /// through an approved factory or has been disabled;
    /// [`LedgerError::NotAModule`] if the module lost its approval.
    pub fn initialize_module(&mut self, module: &Address, basket: &Address) -> Result<(), LedgerError> {
        let enabled = self.state.registry.is_basket(basket);
        let approved = self.state.registry.is_module(module);
        let target = self.basket_mut(basket)?;
        target.ensure_not_locked_by_other(module)?;
        let state = target.module_state(module);
        if state != ModuleState::Pending {
            return Err(LedgerError::NotPending {
                module: module.clone(),
                state,
            });
        }
        if !enabled {
            return Err(LedgerError::BasketNotEnabled(basket.clone()));
        }
        if !approved {
            return Err(LedgerError::NotAModule(module.clone()));
        }
        target.complete_initialization(module)?;
        info!(basket = %basket, module = %module, "module initialized");
        self.emit(LedgerEvent::ModuleInitialized {
            basket: basket.clone(),
            module: module.clone(),
        });
        Ok(())
    }

    /// Detaches an initialized module. The manager or the module itself may
    /// call this.
    pub fn remove_module_from_basket(&mut self, caller: &Address, basket: &Address, module: &Address) -> Result<(), LedgerError> {
        let target = self.basket_mut(basket)?;
        target.ensure_not_locked_by_other(caller)?;
        if caller != module {
            target.require_manager(caller, "remove modules from the basket")?;
        }
        target.detach_module(module)?;
        info!(basket = %basket, module = %module, "module removed");
        self.emit(LedgerEvent::ModuleRemoved {
            basket: basket.clone(),
            module: module.clone(),
        });
        Ok(())
    }

    /// Manager cancels a module that is still pending.
    pub fn remove_pending_module(&mut self, caller: &Address, basket: &Address, module: &Address) -> Result<(), LedgerError> {
        let target = self.basket_mut(basket)?;
        target.ensure_not_locked_by_other(caller)?;
        target.require_manager(caller, "cancel pending modules")?;
        target.cancel_pending(module)?;
        info!(basket = %basket, module = %module, "pending module cancelled");
        self.emit(LedgerEvent::PendingModuleRemoved {
            basket: basket.clone(),
            module: module.clone(),
        });
        Ok(())
    }

    /// Hands the basket to a new manager.
    pub fn set_manager(&mut self, caller: &Address, basket: &Address, manager: Address) -> Result<(), LedgerError> {
        let target = self.basket_mut(basket)?;
        target.ensure_not_locked_by_other(caller)?;
        target.require_manager(caller, "change the manager")?;
        let previous = target.manager().clone();
        target.set_manager(manager.clone());
        info!(basket = %basket, previous = %previous, manager = %manager, "manager changed");
        self.emit(LedgerEvent::ManagerChanged {
            basket: basket.clone(),
            previous,
            manager,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Position primitives
    // -----------------------------------------------------------------------

    /// Replaces the default unit of `component`. The caller is the manager
    /// or an initialized module.
    pub fn edit_default_position(
        &mut self,
        caller: &Address,
        basket: &Address,
        component: &Address,
        unit: i128,
    ) -> Result<(), LedgerError> {
        let is_manager = self.basket(basket)?.manager() == caller;
        if is_manager {
            self.basket(basket)?.ensure_not_locked_by_other(caller)?;
        } else {
            self.require_live_module(caller, basket)?;
        }
        let change = self.basket_mut(basket)?.set_default_position(component, unit)?;
        debug!(basket = %basket, component = %component, unit = %unit, "default position edited");
        self.emit(LedgerEvent::DefaultPositionEdited {
            basket: basket.clone(),
            component: component.clone(),
            unit,
        });
        self.emit_component_change(basket, component, change);
        Ok(())
    }

    /// Replaces `module`'s external position in `component`. Only `module`
    /// itself may call this.
    pub fn edit_external_position(
        &mut self,
        caller: &Address,
        basket: &Address,
        component: &Address,
        module: &Address,
        unit: i128,
        data: Vec<u8>,
    ) -> Result<(), LedgerError> {
        self.require_live_module(caller, basket)?;
        if caller != module {
            return Err(LedgerError::unauthorized(
                caller,
                format!("edit the external position of {module}"),
            ));
        }
        let change = self
            .basket_mut(basket)?
            .set_external_position(component, module, unit, data)?;
        debug!(basket = %basket, component = %component, module = %module, unit = %unit, "external position edited");
        self.emit(LedgerEvent::ExternalPositionEdited {
            basket: basket.clone(),
            component: component.clone(),
            module: module.clone(),
            unit,
        });
        self.emit_component_change(basket, component, change);
        Ok(())
    }

    /// Issues basket shares to `holder`.
    pub fn mint_shares(&mut self, caller: &Address, basket: &Address, holder: &Address, amount: u128) -> Result<(), LedgerError> {
        self.require_live_module(caller, basket)?;
        self.basket_mut(basket)?.mint(holder, amount)?;
        debug!(basket = %basket, holder = %holder, amount = %amount, "shares minted");
        self.emit(LedgerEvent::SharesMinted {
            basket: basket.clone(),
            holder: holder.clone(),
            amount,
        });
        Ok(())
    }

    /// Destroys `holder`'s basket shares.
    pub fn burn_shares(&mut self, caller: &Address, basket: &Address, holder: &Address, amount: u128) -> Result<(), LedgerError> {
        self.require_live_module(caller, basket)?;
        self.basket_mut(basket)?.burn(holder, amount)?;
        debug!(basket = %basket, holder = %holder, amount = %amount, "shares burned");
        self.emit(LedgerEvent::SharesBurned {
            basket: basket.clone(),
            holder: holder.clone(),
            amount,
        });
        Ok(())
    }

    /// Moves `amount` of `asset` out of the basket's custody.
    pub fn invoke_transfer(
        &mut self,
        caller: &Address,
        basket: &Address,
        asset: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), LedgerError> {
        self.require_live_module(caller, basket)?;
        self.state.tokens.transfer(asset, basket, to, amount)?;
        self.emit(LedgerEvent::BasketTransfer {
            basket: basket.clone(),
            module: caller.clone(),
            asset: asset.clone(),
            to: to.clone(),
            amount,
        });
        Ok(())
    }

    /// Has `adapter` execute `call` with the basket's custody as the acting
    /// account. Returns the flows the adapter reports.
    ///
    /// The basket is locked to `caller` while the adapter runs, so a
    /// callback into the basket by anyone else fails
    /// [`LedgerError::ReentrantCall`]. Inside [`operate`](Engine::operate)
    /// the caller already holds the lock and keeps it.
    pub fn invoke(
        &mut self,
        caller: &Address,
        basket: &Address,
        adapter: &Arc<dyn Adapter>,
        call: &CallData,
    ) -> Result<Vec<TokenFlow>, LedgerError> {
        self.require_live_module(caller, basket)?;
        debug!(basket = %basket, module = %caller, adapter = adapter.name(), bytes = call.len(), "invoking adapter");
        let adapter = Arc::clone(adapter);
        self.atomically("invoke", |engine| {
            let take_lock = engine.basket(basket)?.locker().is_none();
            if take_lock {
                engine.basket_mut(basket)?.acquire_lock(caller)?;
            }
            let flows = adapter.execute(&mut Invocation::new(engine, basket.clone()), call)?;
            if take_lock {
                engine.basket_mut(basket)?.release_lock();
            }
            engine.emit(LedgerEvent::BasketInvoked {
                basket: basket.clone(),
                module: caller.clone(),
                adapter: adapter.name().to_string(),
            });
            Ok(flows)
        })
    }

    /// Has `adapter` execute `call` with the caller's own custody as the
    /// acting account. Only approved modules may do this.
    pub fn call_adapter(
        &mut self,
        caller: &Address,
        adapter: &Arc<dyn Adapter>,
        call: &CallData,
    ) -> Result<Vec<TokenFlow>, LedgerError> {
        if !self.state.registry.is_module(caller) {
            return Err(LedgerError::unauthorized(caller, "call adapters"));
        }
        debug!(module = %caller, adapter = adapter.name(), "calling adapter on own custody");
        let adapter = Arc::clone(adapter);
        self.atomically("call_adapter", |engine| {
            adapter.execute(&mut Invocation::new(engine, caller.clone()), call)
        })
    }

    // -----------------------------------------------------------------------
    // Token custody
    // -----------------------------------------------------------------------

    /// Moves the caller's own shares of `basket` to `to`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownBasket`], [`LedgerError::ReentrantCall`] while a
    /// module operation holds the basket, or
    /// [`LedgerError::InsufficientBalance`]. On error nothing changes.
    pub fn transfer_shares(&mut self, caller: &Address, basket: &Address, to: &Address, amount: u128) -> Result<(), LedgerError> {
        self.basket(basket)?.ensure_not_locked_by_other(caller)?;
        self.basket_mut(basket)?.transfer_shares(caller, to, amount)?;
        debug!(basket = %basket, from = %caller, to = %to, amount = %amount, "shares transferred");
        self.emit(LedgerEvent::SharesTransferred {
            basket: basket.clone(),
            from: caller.clone(),
            to: to.clone(),
            amount,
        });
        Ok(())
    }

    /// Moves the caller's own tokens.
    pub fn transfer(&mut self, caller: &Address, asset: &Address, to: &Address, amount: u128) -> Result<(), LedgerError> {
        self.state.tokens.transfer(asset, caller, to, amount)
    }

    /// Lets `spender` move up to `amount` of the caller's `asset`.
    pub fn approve(&mut self, caller: &Address, asset: &Address, spender: &Address, amount: u128) {
        self.state.tokens.approve(asset, caller, spender, amount);
    }

    /// Moves `owner`'s tokens on the caller's allowance.
    pub fn transfer_from(
        &mut self,
        caller: &Address,
        asset: &Address,
        owner: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), LedgerError> {
        self.state.tokens.transfer_from(asset, caller, owner, to, amount)
    }

    /// Admin-only faucet: creates `amount` of `asset` for `to`. Used by
    /// genesis seeding and tests.
    pub fn fund(&mut self, caller: &Address, asset: &Address, to: &Address, amount: u128) -> Result<(), LedgerError> {
        if caller != self.state.registry.admin() {
            return Err(LedgerError::unauthorized(caller, "mint assets"));
        }
        self.state.tokens.mint(asset, to, amount)
    }

    pub(crate) fn tokens_mut(&mut self) -> &mut TokenLedger {
        &mut self.state.tokens
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn basket_mut(&mut self, address: &Address) -> Result<&mut Basket, LedgerError> {
        self.state
            .baskets
            .get_mut(address)
            .ok_or_else(|| LedgerError::UnknownBasket(address.clone()))
    }

    fn require_live_module(&self, caller: &Address, basket: &Address) -> Result<(), LedgerError> {
        let target = self.basket(basket)?;
        target.ensure_not_locked_by_other(caller)?;
        if !target.is_initialized_module(caller) {
            return Err(LedgerError::ModuleNotInitialized {
                module: caller.clone(),
                basket: basket.clone(),
            });
        }
        if !self.state.registry.is_module(caller) {
            return Err(LedgerError::unauthorized(caller, "act as a module"));
        }
        Ok(())
    }

    pub(crate) fn emit(&mut self, event: LedgerEvent) {
        match self.operation {
            Some(operation) => {
                self.events.push(operation, event);
            }
            None => {
                self.events.push(Uuid::new_v4(), event);
                self.events.prune(self.config.event_retention);
            }
        }
    }

    fn emit_component_change(&mut self, basket: &Address, component: &Address, change: ComponentChange) {
        let event = match change {
            ComponentChange::Added => LedgerEvent::ComponentAdded {
                basket: basket.clone(),
                component: component.clone(),
            },
            ComponentChange::Removed => LedgerEvent::ComponentRemoved {
                basket: basket.clone(),
                component: component.clone(),
            },
            ComponentChange::Unchanged => return,
        };
        self.emit(event);
    }
}

fn validate_request(request: &BasketRequest, config: &LedgerConfig) -> Result<(), LedgerError> {
    if request.components.is_empty() {
        return Err(LedgerError::InvalidArgument("at least one component is required".into()));
    }
    if request.components.len() != request.units.len() {
        return Err(LedgerError::InvalidArgument(format!(
            "{} components but {} units",
            request.components.len(),
            request.units.len()
        )));
    }
    if request.components.len() > config.max_components {
        return Err(LedgerError::InvalidArgument(format!(
            "at most {} components allowed",
            config.max_components
        )));
    }
    for (i, component) in request.components.iter().enumerate() {
        if request.components[..i].contains(component) {
            return Err(LedgerError::InvalidArgument(format!("duplicate component {component}")));
        }
    }
    if let Some(unit) = request.units.iter().find(|unit| **unit <= 0) {
        return Err(LedgerError::InvalidArgument(format!("units must be positive, got {unit}")));
    }
    for (i, module) in request.modules.iter().enumerate() {
        if request.modules[..i].contains(module) {
            return Err(LedgerError::InvalidArgument(format!("duplicate module {module}")));
        }
    }
    if !request.share_split.is_empty() {
        if request.share_split.len() != request.components.len() {
            return Err(LedgerError::InvalidArgument(format!(
                "share split has {} weights for {} components",
                request.share_split.len(),
                request.components.len()
            )));
        }
        if request.share_split.iter().all(|weight| *weight == 0) {
            return Err(LedgerError::InvalidArgument("share split weights are all zero".into()));
        }
    }
    Ok(())
}
