use std::collections::VecDeque;

/// 一个阻塞读取者在队列中的位置。
///
/// 票据只可比较身份，不暴露任何顺序以外的信息。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

/// 等待票据的 FIFO 队列。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 条件变量的唤醒顺序没有任何公平保证，多个读取者同时等待时可能出现“后来者先得”；
/// - 显式票据队列把“轮到谁”与“被谁唤醒”解耦：每个被唤醒的线程都要检查自己是否位于队首。
///
/// ## 契约说明（What）
/// - `enqueue` 在队尾发放新票据，票据在队列生命周期内唯一；
/// - `is_head` 判定票据是否位于队首；
/// - `remove` 移除任意位置的票据（服务完成、超时或关闭时调用），返回票据是否存在；
/// - 队列不持有任何锁，调用方必须在所属缓冲的临界区内操作。
#[derive(Debug, Default)]
pub struct TicketQueue {
    tickets: VecDeque<Ticket>,
    next: u64,
}

impl TicketQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在队尾登记一个新的等待者。
    pub fn enqueue(&mut self) -> Ticket {
        let ticket = Ticket(self.next);
        self.next = self.next.wrapping_add(1);
        self.tickets.push_back(ticket);
        ticket
    }

    pub fn head(&self) -> Option<Ticket> {
        self.tickets.front().copied()
    }

    pub fn is_head(&self, ticket: Ticket) -> bool {
        self.head() == Some(ticket)
    }

    /// 移除票据；队首出队是常见路径，其余位置需线性查找。
    pub fn remove(&mut self, ticket: Ticket) -> bool {
        if self.is_head(ticket) {
            self.tickets.pop_front();
            return true;
        }
        match self.tickets.iter().position(|candidate| *candidate == ticket) {
            Some(index) => {
                self.tickets.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }
}
