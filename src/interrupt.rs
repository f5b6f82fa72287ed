use log::warn;

pub const IRQ_LINES: u8 = 8;

// Register offsets from `INTERRUPT_START`
pub const REG_ENABLE: u16 = 0x0;
pub const REG_PENDING: u16 = 0x1;
pub const REG_MASK: u16 = 0x2;
pub const REG_HANDLER_LO: u16 = 0x3;
pub const REG_HANDLER_HI: u16 = 0x4;
/// First of eight routing registers, one per line
pub const REG_ROUTE: u16 = 0x8;

/// Out-of-band channel devices use to raise interrupts.
pub trait InterruptSink {
    fn request_interrupt(&mut self, irq: u8);
}

/// Which CPU and core services a line.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct Route {
    pub cpu: u8,
    pub core: u8,
}

impl Route {
    fn from_byte(byte: u8) -> Self {
        Route {
            cpu: byte >> 4,
            core: byte & 0x0F,
        }
    }

    fn to_byte(self) -> u8 {
        (self.cpu << 4) | (self.core & 0x0F)
    }
}

/// Eight-line priority interrupt controller. Line 0 has the highest priority.
#[derive(Debug, Default)]
pub struct InterruptController {
    enabled: u8,
    pending: u8,
    mask: u8,
    handler_addr: u16,
    routes: [Route; IRQ_LINES as usize],
}

impl InterruptController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise `irq`, to be serviced by whichever core its route names.
    pub fn request(&mut self, irq: u8) {
        if irq >= IRQ_LINES {
            warn!("Ignoring request for nonexistent IRQ {irq}");
            return;
        }
        self.pending |= 1 << irq;
    }

    /// Raise `irq` and route it to a specific core.
    pub fn request_for(&mut self, irq: u8, cpu: u8, core: u8) {
        if irq >= IRQ_LINES {
            warn!("Ignoring request for nonexistent IRQ {irq}");
            return;
        }
        self.routes[irq as usize] = Route { cpu, core };
        self.request(irq);
    }

    fn deliverable(&self) -> u8 {
        self.pending & self.enabled & !self.mask
    }

    pub fn has_pending_interrupt(&self) -> bool {
        self.deliverable() != 0
    }

    /// Lowest deliverable line routed to the given core.
    pub fn pending_irq(&self, cpu: usize, core: usize) -> Option<u8> {
        let deliverable = self.deliverable();
        (0..IRQ_LINES).find(|&irq| {
            let route = self.routes[irq as usize];
            deliverable & (1 << irq) != 0
                && route.cpu as usize == cpu
                && route.core as usize == core
        })
    }

    /// Clears the pending bit of that line only.
    pub fn acknowledge(&mut self, irq: u8) {
        if irq < IRQ_LINES {
            self.pending &= !(1 << irq);
        }
    }

    pub fn handler_addr(&self) -> u16 {
        self.handler_addr
    }

    pub fn set_handler_addr(&mut self, addr: u16) {
        self.handler_addr = addr;
    }

    pub fn enabled(&self) -> u8 {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: u8) {
        self.enabled = enabled;
    }

    pub fn pending(&self) -> u8 {
        self.pending
    }

    pub fn mask(&self) -> u8 {
        self.mask
    }

    pub fn set_mask(&mut self, mask: u8) {
        self.mask = mask;
    }

    /// Register read at an offset into the controller block.
    pub fn read(&self, offset: u16) -> u8 {
        match offset {
            REG_ENABLE => self.enabled,
            REG_PENDING => self.pending,
            REG_MASK => self.mask,
            REG_HANDLER_LO => (self.handler_addr & 0xFF) as u8,
            REG_HANDLER_HI => (self.handler_addr >> 8) as u8,
            REG_ROUTE..=0xF => self.routes[(offset - REG_ROUTE) as usize].to_byte(),
            _ => {
                warn!("Read from unused interrupt controller register {offset}");
                0
            }
        }
    }

    pub fn write(&mut self, offset: u16, value: u8) {
        match offset {
            REG_ENABLE => self.enabled = value,
            // Writing a 1 bit acknowledges that line
            REG_PENDING => self.pending &= !value,
            REG_MASK => self.mask = value,
            REG_HANDLER_LO => self.handler_addr = (self.handler_addr & 0xFF00) | value as u16,
            REG_HANDLER_HI => {
                self.handler_addr = (self.handler_addr & 0x00FF) | ((value as u16) << 8)
            }
            REG_ROUTE..=0xF => self.routes[(offset - REG_ROUTE) as usize] = Route::from_byte(value),
            _ => warn!("Write to unused interrupt controller register {offset}"),
        }
    }
}

impl InterruptSink for InterruptController {
    fn request_interrupt(&mut self, irq: u8) {
        self.request(irq);
    }
}
