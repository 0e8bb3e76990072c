use serde::{Deserialize, Serialize};

use eventide_core::{DomainError, DomainResult, impl_message};
use eventide_events::{BehaviorBuilder, CommandContext, Effect, Event, EventSourcedEntity};

/// Monetary amount split into whole units and cents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub currency: String,
    pub units: i64,
    pub cents: i32,
}

impl Money {
    pub fn new(currency: impl Into<String>, units: i64, cents: i32) -> Self {
        Self {
            currency: currency.into(),
            units,
            cents,
        }
    }

    /// Validate currency code and ranges.
    ///
    /// Currency must be a three-letter uppercase code; `units >= 0`; `cents` in `0..=99`.
    pub fn validate(&self) -> DomainResult<()> {
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(DomainError::validation(
                "currency must be a three-letter uppercase code",
            ));
        }
        if self.units < 0 {
            return Err(DomainError::validation("price units cannot be negative"));
        }
        if !(0..=99).contains(&self.cents) {
            return Err(DomainError::validation("price cents must be between 0 and 99"));
        }
        Ok(())
    }
}

/// Product state (rebuilt from events).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductState {
    pub name: String,
    pub price: Money,
    pub created: bool,
}

/// Command: CreateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub name: String,
    pub price: Money,
}

/// Command: ChangeProductName.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeProductName {
    pub new_name: String,
}

/// Command: ChangeProductPrice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeProductPrice {
    pub new_price: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetProduct {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    ChangeProductName(ChangeProductName),
    ChangeProductPrice(ChangeProductPrice),
    GetProduct(GetProduct),
}

impl_message!(ProductCommand {
    CreateProduct(CreateProduct) => "CreateProduct",
    ChangeProductName(ChangeProductName) => "ChangeProductName",
    ChangeProductPrice(ChangeProductPrice) => "ChangeProductPrice",
    GetProduct(GetProduct) => "GetProduct",
});

/// Event: ProductCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub name: String,
    pub price: Money,
}

/// Event: ProductNameChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductNameChanged {
    pub new_name: String,
}

/// Event: ProductPriceChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPriceChanged {
    pub new_price: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    ProductNameChanged(ProductNameChanged),
    ProductPriceChanged(ProductPriceChanged),
}

impl_message!(ProductEvent {
    ProductCreated(ProductCreated) => "ProductCreated",
    ProductNameChanged(ProductNameChanged) => "ProductNameChanged",
    ProductPriceChanged(ProductPriceChanged) => "ProductPriceChanged",
});

impl Event for ProductEvent {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductReply {
    Done,
    Product(ProductState),
}

/// Entity: Product.
#[derive(Debug, Clone, Copy)]
pub struct Product;

impl EventSourcedEntity for Product {
    const ENTITY_TYPE: &'static str = "product";

    type State = ProductState;
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Reply = ProductReply;

    fn empty_state() -> ProductState {
        ProductState::default()
    }

    fn register(b: &mut BehaviorBuilder<Self>) {
        b.on_command(Self::create)
            .on_command(Self::change_name)
            .on_command(Self::change_price)
            .on_command(Self::get)
            .on_event(Self::created)
            .on_event(Self::name_changed)
            .on_event(Self::price_changed);
    }
}

impl Product {
    fn ensure_created(state: &ProductState) -> DomainResult<()> {
        if !state.created {
            return Err(DomainError::not_found("product does not exist"));
        }
        Ok(())
    }

    fn validate_name(name: &str) -> DomainResult<()> {
        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        Ok(())
    }

    fn create(state: &ProductState, cmd: CreateProduct, _: &CommandContext) -> Effect<Product> {
        if state.created {
            return Effect::error(DomainError::conflict("product already exists"));
        }
        if let Err(e) = Self::validate_name(&cmd.name).and_then(|_| cmd.price.validate()) {
            return Effect::error(e);
        }
        Effect::emit(ProductEvent::ProductCreated(ProductCreated {
            name: cmd.name,
            price: cmd.price,
        }))
        .then_reply(|_| ProductReply::Done)
    }

    fn change_name(
        state: &ProductState,
        cmd: ChangeProductName,
        _: &CommandContext,
    ) -> Effect<Product> {
        if let Err(e) = Self::ensure_created(state).and_then(|_| Self::validate_name(&cmd.new_name))
        {
            return Effect::error(e);
        }
        Effect::emit(ProductEvent::ProductNameChanged(ProductNameChanged {
            new_name: cmd.new_name,
        }))
        .then_reply(|_| ProductReply::Done)
    }

    fn change_price(
        state: &ProductState,
        cmd: ChangeProductPrice,
        _: &CommandContext,
    ) -> Effect<Product> {
        if let Err(e) = Self::ensure_created(state).and_then(|_| cmd.new_price.validate()) {
            return Effect::error(e);
        }
        Effect::emit(ProductEvent::ProductPriceChanged(ProductPriceChanged {
            new_price: cmd.new_price,
        }))
        .then_reply(|_| ProductReply::Done)
    }

    fn get(state: &ProductState, _: GetProduct, _: &CommandContext) -> Effect<Product> {
        match Self::ensure_created(state) {
            Ok(()) => Effect::reply(ProductReply::Product(state.clone())),
            Err(e) => Effect::error(e),
        }
    }

    fn created(_: ProductState, e: &ProductCreated) -> ProductState {
        ProductState {
            name: e.name.clone(),
            price: e.price.clone(),
            created: true,
        }
    }

    fn name_changed(state: ProductState, e: &ProductNameChanged) -> ProductState {
        ProductState {
            name: e.new_name.clone(),
            ..state
        }
    }

    fn price_changed(state: ProductState, e: &ProductPriceChanged) -> ProductState {
        ProductState {
            price: e.new_price.clone(),
            ..state
        }
    }
}
