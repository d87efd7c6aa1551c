use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProducer, GoalReachedEvent, Handler, SettlementEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub settlement_producer: Vec<EventProducer<SettlementEvent>>,
    pub goal_reached_producer: Vec<EventProducer<GoalReachedEvent>>,
}

pub struct EventHandlers {
    pub on_settlement: Option<EventHandler<SettlementEvent>>,
    pub on_goal_reached: Option<EventHandler<GoalReachedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_settlement = hooks.on_settlement.map(|f| EventHandler::new(buffer_size, f));
        let on_goal_reached = hooks.on_goal_reached.map(|f| EventHandler::new(buffer_size, f));
        Self { on_settlement, on_goal_reached }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_settlement {
            result.settlement_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_goal_reached {
            result.goal_reached_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_settlement {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_goal_reached {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_settlement: Option<Handler<SettlementEvent>>,
    pub on_goal_reached: Option<Handler<GoalReachedEvent>>,
}

impl EventHooks {
    pub fn on_settlement<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(SettlementEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_settlement = Some(Arc::new(f));
        self
    }

    pub fn on_goal_reached<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(GoalReachedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_goal_reached = Some(Arc::new(f));
        self
    }
}
